// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Moving a board between modes by loading a different FX2 firmware and waiting for it to come
//! back under its new identity.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::board::{Board, BoardState, BoardType};
use crate::error::{ErrorKind, Result};
use crate::loader::fx2;

/// Source of fresh board lists.
pub trait BoardScanner
{
	fn scan(&mut self) -> Result<Vec<Board>>;
}

/// Something that can put a firmware image into a board's FX2.
pub trait Fx2Loader
{
	/// `firmware` is a name relative to the firmware directory, like `fx2/opsis/usb-uart.ihx`.
	fn load_fx2(&mut self, board: &Board, firmware: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOptions
{
	pub poll_interval: Duration,
	/// Show a spinner while waiting for the board.
	pub show_progress: bool,
}

impl Default for SwitchOptions
{
	fn default() -> Self
	{
		Self {
			poll_interval: Duration::from_secs(1),
			show_progress: false,
		}
	}
}

/// Check a board type can be switched into `target`, and return the FX2 firmware that does it.
pub fn transition_firmware(board_type: BoardType, target: BoardState) -> Result<PathBuf>
{
	let unsupported = |reason| {
		ErrorKind::UnsupportedTransition {
			board_type,
			target,
			reason,
		}
		.error()
	};

	match (board_type, target) {
		(_, BoardState::Jtag) => (),
		(BoardType::Opsis, BoardState::Serial | BoardState::Eeprom) => (),
		(BoardType::Atlys, BoardState::Serial | BoardState::Eeprom) => {
			return Err(unsupported("the Atlys only has a JTAG firmware"));
		},
		(_, BoardState::Operational) => {
			return Err(unsupported("operational mode needs gateware, flash it and power cycle instead"));
		},
		_ => return Err(unsupported("this mode cannot be switched into")),
	}

	fx2::mode_firmware_path(board_type, target).ok_or_else(|| unsupported("no FX2 firmware for this mode"))
}

/// Result of looking at one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome
{
	Switched(Board),
	Pending,
}

/// Find the switched board among `scanned`. Boards of other types, or on other ports when both
/// sides know their port, are not candidates.
pub fn examine_scan(old: &Board, target: BoardState, scanned: Vec<Board>) -> Result<PollOutcome>
{
	let old_port = old.port();
	for board in scanned {
		if board.board_type != old.board_type {
			continue;
		}
		if let (Some(old_port), Some(new_port)) = (&old_port, board.port()) {
			if *old_port != new_port {
				continue;
			}
		}

		if board.state == target {
			return Ok(PollOutcome::Switched(board));
		}
		if board.state == old.state {
			debug!("Board still in {} mode", board.state);
			continue;
		}
		return Err(ErrorKind::UnexpectedState {
			board_type: old.board_type,
			previous: old.state,
			expected: target,
			observed: board.state,
		}
		.error());
	}
	Ok(PollOutcome::Pending)
}

pub struct ModeSwitcher<'h, H>
{
	host: &'h mut H,
	options: SwitchOptions,
}

impl<'h, H> ModeSwitcher<'h, H>
where
	H: BoardScanner + Fx2Loader,
{
	pub fn new(host: &'h mut H, options: SwitchOptions) -> Self
	{
		Self {
			host,
			options,
		}
	}

	/// Put `board` into `target` mode and return it as it now enumerates. With no timeout this
	/// waits for as long as it takes.
	pub fn switch_mode(&mut self, board: Board, target: BoardState, timeout: Option<Duration>) -> Result<Board>
	{
		let firmware = transition_firmware(board.board_type, target)?;
		if board.state == target {
			debug!("{} is already in {} mode", board.board_type.human_name(), target);
			return Ok(board);
		}

		info!("Switching {} from {} to {} mode", board.board_type.human_name(), board.state, target);
		self.host.load_fx2(&board, &firmware)?;
		self.wait_for(&board, target, timeout)
	}

	fn wait_for(&mut self, old: &Board, target: BoardState, timeout: Option<Duration>) -> Result<Board>
	{
		let spinner = self.options.show_progress.then(|| {
			let spinner = ProgressBar::new_spinner().with_message(format!("Waiting for the board to become {}", target));
			if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]") {
				spinner.set_style(style);
			}
			spinner.enable_steady_tick(Duration::from_millis(100));
			spinner
		});

		let started = Instant::now();
		let result = loop {
			match self.host.scan().and_then(|boards| examine_scan(old, target, boards)) {
				Ok(PollOutcome::Switched(board)) => break Ok(board),
				Ok(PollOutcome::Pending) => (),
				Err(e) => break Err(e),
			}

			let waited = started.elapsed();
			if timeout.is_some_and(|timeout| waited >= timeout) {
				break Err(ErrorKind::Timeout {
					board_type: old.board_type,
					target,
					waited,
				}
				.error());
			}
			thread::sleep(self.options.poll_interval);
		};

		if let Some(spinner) = spinner {
			spinner.finish_and_clear();
		}
		result
	}
}
