// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::mem;

use log::{error, warn};

use crate::BoardParams;
use crate::board::classify::IgnoreReason;
use crate::board::{Board, BoardType, find_boards};
use crate::error::{Error, ErrorKind, Result};
use crate::usb::{Device, PortId, UsbBackend};

/// Narrows the attached boards down to the ones an operation should act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardMatcher
{
	board_type: Option<BoardType>,
	position: Option<PortId>,
}

impl BoardMatcher
{
	pub fn new() -> Self
	{
		Default::default()
	}

	pub fn from_params<Params>(params: &Params) -> Self
	where
		Params: BoardParams,
	{
		Self::new()
			.board_type(params.board_type())
			.position(params.position())
	}

	/// Set the board type to match against.
	#[must_use]
	pub fn board_type(mut self, board_type: Option<BoardType>) -> Self
	{
		self.board_type = board_type;
		self
	}

	/// Set the USB port to match against.
	#[must_use]
	pub fn position(mut self, position: Option<PortId>) -> Self
	{
		self.position = position;
		self
	}

	pub fn get_board_type(&self) -> Option<BoardType>
	{
		self.board_type
	}

	pub fn get_position(&self) -> Option<&PortId>
	{
		self.position.as_ref()
	}

	/// Whether `board` passes every criterion that was set. Unset criteria always match.
	pub fn matches(&self, board: &Board) -> bool
	{
		let type_matches = self.board_type.is_none_or(|board_type| board_type == board.board_type);
		let position_matches = self
			.position
			.as_ref()
			.is_none_or(|position| Some(position) == board.port().as_ref());
		type_matches && position_matches
	}

	/// Scan for boards and sort them into matching and filtered out.
	pub fn find_matching_boards(&self, backend: &mut dyn UsbBackend) -> Result<BoardMatchResults>
	{
		let scan = find_boards(backend)?;
		let (found, filtered_out): (Vec<Board>, Vec<Board>) = scan.boards.into_iter().partition(|board| self.matches(board));
		let ignored = scan
			.ignored
			.into_iter()
			.filter(|(_, reason)| match (self.board_type, reason.board_type()) {
				(Some(wanted), Some(actual)) => wanted == actual,
				_ => true,
			})
			.collect();
		Ok(BoardMatchResults {
			found,
			filtered_out,
			ignored,
		})
	}
}

#[derive(Debug, Default)]
pub struct BoardMatchResults
{
	pub found: Vec<Board>,
	pub filtered_out: Vec<Board>,
	pub ignored: Vec<(Device, IgnoreReason)>,
}

impl BoardMatchResults
{
	fn report_missing(&self)
	{
		match self.filtered_out.len() {
			0 => (),
			1 => warn!("Matching board not found, but this board was filtered out: {}", self.filtered_out[0]),
			count => {
				warn!("Matching boards not found but {} boards were filtered out.", count);
				warn!("Filter arguments (--by-type, --by-position) may be incorrect.");
			},
		}
		if !self.ignored.is_empty() {
			warn!("Some devices could not be identified, one of these may be the board:");
			for (device, reason) in &self.ignored {
				warn!("  {} ({})", device, reason);
			}
		}
	}

	/// Nothing matched. An Opsis running test firmware we don't know is the likelier explanation,
	/// so report that over a plain not found.
	fn missing_error(&self) -> Error
	{
		let unknown_revision = self.ignored.iter().find_map(|(device, reason)| match reason {
			IgnoreReason::UnknownOpsisRevision(Some(revision)) => Some((device, revision)),
			_ => None,
		});
		match unknown_revision {
			Some((device, revision)) => {
				error!("{} is running Opsis test firmware revision {:04x}, which this tool does not know", device, revision.0);
				ErrorKind::UnknownDeviceRevision {
					vid: device.vid.0,
					pid: device.pid.0,
					revision: format!("{:04x}", revision.0),
				}
				.error()
			},
			None => ErrorKind::DeviceNotFound.error(),
		}
	}

	/// Pops all found boards, handling printing error and warning cases.
	pub fn pop_all(&mut self) -> Result<Vec<Board>>
	{
		if self.found.is_empty() {
			self.report_missing();
			self.filtered_out.clear();
			return Err(self.missing_error());
		}
		Ok(mem::take(&mut self.found))
	}

	/// Pops a single found board, handling printing error and warning cases.
	pub fn pop_single(&mut self, operation: &str) -> Result<Board>
	{
		match self.found.len() {
			0 => {
				self.report_missing();
				Err(self.missing_error())
			},
			1 => Ok(self.found.remove(0)),
			found_len => {
				error!("{} operation only accepts one board, but {} were found!", operation, found_len);
				for board in &self.found {
					error!("  {} on port {}", board, board.port().map_or_else(|| "?".into(), |port| port.to_string()));
				}
				error!("Hint: use --all, or narrow it down with --by-type or --by-position.");
				Err(ErrorKind::TooManyDevices.error())
			},
		}
	}
}
