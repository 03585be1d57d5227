// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

pub mod board;
pub mod board_matcher;
pub mod error;
pub mod firmware_file;
pub mod loader;
pub mod locator;
pub mod openocd;
pub mod session;
pub mod switcher;
pub mod tool;
pub mod usb;

use crate::board::BoardType;
use crate::usb::PortId;

/// Board selection criteria, as given on a command line.
pub trait BoardParams
{
	fn board_type(&self) -> Option<BoardType>;
	fn position(&self) -> Option<PortId>;
}
