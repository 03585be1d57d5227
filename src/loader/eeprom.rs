// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use crate::board::{Board, BoardState, BoardType};
use crate::error::{ErrorKind, Result};

/// Write the FX2 EEPROM while the board runs the EEPROM-mode firmware.
///
/// The board-side protocol for this is not implemented, so after checking the board could take
/// the write this always fails with [ErrorKind::CapabilityUnavailable]. Use the DFU bootloader
/// route in [super::dfu] instead.
pub fn flash_eeprom(board: &Board) -> Result<()>
{
	if board.board_type != BoardType::Opsis {
		return Err(ErrorKind::UnsupportedTransition {
			board_type: board.board_type,
			target: BoardState::Eeprom,
			reason: "only the Opsis has an EEPROM mode",
		}
		.error());
	}
	if board.state != BoardState::Eeprom {
		return Err(ErrorKind::BoardNotReady {
			board_type: board.board_type,
			reason: format!("in {} mode, EEPROM writes need eeprom mode", board.state),
		}
		.error());
	}

	Err(ErrorKind::CapabilityUnavailable("Writing the FX2 EEPROM from EEPROM mode").error())
}
