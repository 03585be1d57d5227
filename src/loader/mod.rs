// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Firmware loading and flashing. Every loader validates its artifact before anything is sent to
//! the board, and detaches kernel drivers itself rather than trusting an earlier check.

use log::info;

use crate::board::{Board, BoardState};
use crate::error::{ErrorKind, Result};
use crate::locator::FirmwareLocator;
use crate::openocd::OpenOcdOptions;
use crate::tool::ToolRunner;
use crate::usb::UsbBackend;

pub mod dfu;
pub mod eeprom;
pub mod fx2;
pub mod jtag;
pub mod spi;

/// Everything a loader needs from the outside world.
pub struct LoadContext<'a>
{
	pub backend: &'a mut dyn UsbBackend,
	pub runner: &'a dyn ToolRunner,
	pub locator: &'a FirmwareLocator,
	/// The `-v` count.
	pub verbosity: u8,
}

impl LoadContext<'_>
{
	pub fn openocd_options(&self) -> OpenOcdOptions
	{
		OpenOcdOptions {
			verbosity: self.verbosity,
		}
	}
}

pub(crate) fn detach_board_drivers(ctx: &LoadContext, board: &Board) -> Result<()>
{
	if ctx.backend.in_use(&board.device)? {
		info!("Detaching drivers from board.");
		ctx.backend.detach(&board.device)?;
	}
	Ok(())
}

/// JTAG operations need the board in JTAG mode with nothing else holding its interfaces.
pub(crate) fn ensure_jtag_ready(ctx: &LoadContext, board: &Board) -> Result<()>
{
	if board.state != BoardState::Jtag {
		return Err(ErrorKind::BoardNotReady {
			board_type: board.board_type,
			reason: format!("in {} mode, JTAG operations need jtag mode", board.state),
		}
		.error());
	}

	detach_board_drivers(ctx, board)?;
	if ctx.backend.in_use(&board.device)? {
		return Err(ErrorKind::BoardNotReady {
			board_type: board.board_type,
			reason: format!("drivers {:?} are still bound", ctx.backend.drivers(&board.device)?),
		}
		.error());
	}
	Ok(())
}
