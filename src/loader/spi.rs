// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Writing the configuration SPI flash through a JTAG-to-SPI proxy bitstream.

use std::path::Path;

use log::{debug, warn};

use super::{LoadContext, ensure_jtag_ready};
use crate::board::{Board, FlashLayout};
use crate::error::Result;
use crate::firmware_file::{BiosImage, FirmwareImage, FlashBootImage, XilinxBinFile};
use crate::openocd::{self, OpenOcdScript};

/// All zeros, written over the firmware region to erase it.
pub const ZERO_IMAGE: &str = "zero.bin";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlashRegion
{
	Gateware,
	Bios,
	Firmware,
}

impl FlashRegion
{
	pub fn offset(self, layout: FlashLayout) -> u32
	{
		match self {
			Self::Gateware => layout.gateware,
			Self::Bios => layout.bios,
			Self::Firmware => layout.firmware,
		}
	}
}

/// Write a Xilinx `.bin` configuration image to the start of flash.
pub fn flash_gateware(ctx: &LoadContext, board: &Board, file: &Path) -> Result<()>
{
	let path = ctx.locator.locate(file)?;
	XilinxBinFile::from_path(&path)?;
	program_flash(ctx, board, &path, FlashRegion::Gateware)
}

/// A full flash image starts with the gateware, so it goes in the same way.
pub fn flash_image(ctx: &LoadContext, board: &Board, file: &Path) -> Result<()>
{
	flash_gateware(ctx, board, file)
}

pub fn flash_bios(ctx: &LoadContext, board: &Board, file: &Path) -> Result<()>
{
	let path = ctx.locator.locate(file)?;
	BiosImage::from_path(&path)?;
	program_flash(ctx, board, &path, FlashRegion::Bios)
}

/// Write a `.fbi` boot image, or erase the firmware region when no file is given.
pub fn flash_firmware(ctx: &LoadContext, board: &Board, file: Option<&Path>) -> Result<()>
{
	match file {
		Some(file) => {
			let path = ctx.locator.locate(file)?;
			FlashBootImage::from_path(&path)?;
			program_flash(ctx, board, &path, FlashRegion::Firmware)
		},
		None => clear_firmware(ctx, board),
	}
}

pub fn clear_firmware(ctx: &LoadContext, board: &Board) -> Result<()>
{
	let path = ctx.locator.locate(ZERO_IMAGE)?;
	program_flash(ctx, board, &path, FlashRegion::Firmware)
}

fn program_flash(ctx: &LoadContext, board: &Board, image: &Path, region: FlashRegion) -> Result<()>
{
	ensure_jtag_ready(ctx, board)?;
	let proxy = ctx.locator.locate(board.board_type.flash_proxy())?;
	let offset = region.offset(board.board_type.flash_layout());
	debug!("Writing {} to flash at 0x{:x}", image.display(), offset);

	let mut script = OpenOcdScript::new().jtagspi_init(&proxy);
	if ctx.verbosity > 1 {
		script = script.command("flash banks").command("flash list");
	}
	if ctx.verbosity > 2 {
		script = script.command("flash info 0");
	}
	let script = script.jtagspi_program(image, offset).exit();

	let result = openocd::run_script(ctx.runner, board.board_type, &script, ctx.openocd_options());
	warn!("After flashing, the board will need to be power cycled.");
	result.map(|_| ())
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::board::BoardType;

	#[test]
	fn regions_map_to_the_board_layout()
	{
		let layout = BoardType::Opsis.flash_layout();
		assert_eq!(FlashRegion::Gateware.offset(layout), 0);
		assert_eq!(FlashRegion::Bios.offset(layout), 0x20_0000);
		assert_eq!(FlashRegion::Firmware.offset(layout), 0x20_8000);
	}
}
