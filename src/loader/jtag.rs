// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use super::{LoadContext, ensure_jtag_ready};
use crate::board::Board;
use crate::error::{ErrorKind, Result};
use crate::firmware_file::{FirmwareImage, XilinxBitFile};
use crate::openocd::{self, Dna, OpenOcdScript};
use crate::tool::ToolFailure;

/// Load a bitstream straight into the FPGA over JTAG. Gone again at the next power cycle.
pub fn load_gateware(ctx: &LoadContext, board: &Board, file: &Path) -> Result<()>
{
	let path = ctx.locator.locate(file)?;
	let bitstream = XilinxBitFile::from_path(&path)?;
	let part = board.board_type.fpga_part();
	if !bitstream.matches_part(part) {
		return Err(ErrorKind::MalformedFirmware {
			path,
			reason: format!("bitstream is for {} but the {} has a {}", bitstream.part, board.board_type.human_name(), part),
		}
		.error());
	}

	ensure_jtag_ready(ctx, board)?;
	let script = OpenOcdScript::new().pld_load(&path).reset_halt().exit();
	openocd::run_script(ctx.runner, board.board_type, &script, ctx.openocd_options())?;
	Ok(())
}

/// Reset the FPGA so it reconfigures from flash.
pub fn reset_gateware(ctx: &LoadContext, board: &Board) -> Result<()>
{
	ensure_jtag_ready(ctx, board)?;
	let script = OpenOcdScript::new().reset_halt().exit();
	openocd::run_script(ctx.runner, board.board_type, &script, ctx.openocd_options())?;
	Ok(())
}

pub fn read_dna(ctx: &LoadContext, board: &Board) -> Result<Dna>
{
	ensure_jtag_ready(ctx, board)?;
	let script = OpenOcdScript::new().exit();
	let command = openocd::script_command(board.board_type, &script, ctx.openocd_options());
	let output = openocd::run_script(ctx.runner, board.board_type, &script, ctx.openocd_options())?;
	openocd::parse_dna(&output.output)
		.map_err(|reason| ErrorKind::RetryableTool(ToolFailure::new(&reason, &command, &output)).error())
}
