// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use crate::board::Board;
use crate::board_matcher::{BoardMatchResults, BoardMatcher};
use crate::error::Result;
use crate::loader::{LoadContext, fx2};
use crate::locator::FirmwareLocator;
use crate::switcher::{BoardScanner, Fx2Loader};
use crate::tool::ToolRunner;
use crate::usb::UsbBackend;

/// The outside world one invocation works against: a USB backend, a way to run tools, and where
/// to find firmware.
pub struct Session
{
	backend: Box<dyn UsbBackend>,
	runner: Box<dyn ToolRunner>,
	locator: FirmwareLocator,
	matcher: BoardMatcher,
	verbosity: u8,
}

impl Session
{
	pub fn new(backend: Box<dyn UsbBackend>, runner: Box<dyn ToolRunner>, locator: FirmwareLocator) -> Self
	{
		Self {
			backend,
			runner,
			locator,
			matcher: BoardMatcher::new(),
			verbosity: 0,
		}
	}

	#[must_use]
	pub fn matcher(mut self, matcher: BoardMatcher) -> Self
	{
		self.matcher = matcher;
		self
	}

	#[must_use]
	pub fn verbosity(mut self, verbosity: u8) -> Self
	{
		self.verbosity = verbosity;
		self
	}

	pub fn backend(&self) -> &dyn UsbBackend
	{
		self.backend.as_ref()
	}

	pub fn locator(&self) -> &FirmwareLocator
	{
		&self.locator
	}

	pub fn load_context(&mut self) -> LoadContext<'_>
	{
		LoadContext {
			backend: self.backend.as_mut(),
			runner: self.runner.as_ref(),
			locator: &self.locator,
			verbosity: self.verbosity,
		}
	}

	/// Scan and filter with this session's matcher.
	pub fn find_boards(&mut self) -> Result<BoardMatchResults>
	{
		self.matcher.find_matching_boards(self.backend.as_mut())
	}
}

impl BoardScanner for Session
{
	fn scan(&mut self) -> Result<Vec<Board>>
	{
		Ok(self.find_boards()?.found)
	}
}

impl Fx2Loader for Session
{
	fn load_fx2(&mut self, board: &Board, firmware: &Path) -> Result<()>
	{
		fx2::load_fx2(&self.load_context(), board, firmware)
	}
}
