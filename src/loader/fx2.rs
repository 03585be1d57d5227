// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use log::{debug, info};

use super::{LoadContext, detach_board_drivers};
use crate::board::{Board, BoardState, BoardType};
use crate::error::{ErrorKind, Result};
use crate::firmware_file::{FirmwareImage, IntelHexImage};
use crate::tool::{ToolCommand, ToolFailure};

/// fxload reports this when the FX2 resets itself into the new firmware before it is done
/// talking to it. The load still worked.
pub const BENIGN_RELOAD_ERROR: &str = "can't modify CPUCS: Protocol error";

/// FX2 firmware to load for each mode the switcher can reach.
pub fn mode_firmware(target: BoardState) -> Option<&'static str>
{
	match target {
		BoardState::Jtag => Some("ixo-usb-jtag.hex"),
		BoardState::Serial => Some("usb-uart.ihx"),
		BoardState::Eeprom => Some("eeprom.ihx"),
		_ => None,
	}
}

/// Where the firmware for `target` lives for this board type, relative to the firmware directory.
pub fn mode_firmware_path(board_type: BoardType, target: BoardState) -> Option<std::path::PathBuf>
{
	mode_firmware(target).map(|file| board_type.fx2_image(file))
}

/// Load an Intel HEX image into the board's FX2 RAM.
pub fn load_fx2(ctx: &LoadContext, board: &Board, firmware: &Path) -> Result<()>
{
	let path = ctx.locator.locate(firmware)?;
	IntelHexImage::from_path(&path)?;

	detach_board_drivers(ctx, board)?;

	info!("Using FX2 firmware {}", firmware.display());
	let mut command = ToolCommand::new("fxload")
		.args(["-t", "fx2lp", "-D"])
		.path_arg(board.device.path.usbfs_path())
		.arg("-I")
		.path_arg(&path)
		.search_path("/usr/sbin")
		.search_path("/sbin");
	if ctx.verbosity > 0 {
		command = command.arg("-v");
	}
	info!("Running {}", command);

	let output = ctx.runner.run(&command)?;
	if output.success() {
		if ctx.verbosity > 2 {
			debug!("{}", output.output);
		}
		return Ok(());
	}
	if output.output.contains(BENIGN_RELOAD_ERROR) {
		debug!("Ignoring fxload complaint: {}", BENIGN_RELOAD_ERROR);
		return Ok(());
	}

	Err(ErrorKind::RetryableTool(ToolFailure::new("fxload failed to load the FX2", &command, &output)).error())
}
