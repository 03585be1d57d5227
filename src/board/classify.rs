// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Mapping from a raw USB identity to the board and state it implies.
//!
//! The same physical board shows up under many VID/PID/revision identities depending on what its
//! FX2 is running, so classification is a pure lookup over the table below. The first matching
//! rule wins.

use std::fmt::{self, Display, Formatter};

use log::{debug, error, warn};

use super::{BoardState, BoardType};
use crate::usb::{DeviceRevision, Pid, Vid};

/// Digilent Adept firmware, as shipped on a new Atlys.
pub const DIGILENT_ADEPT: (Vid, Pid) = (Vid(0x1443), Pid(0x0007));
pub const ATLYS_UNCONFIGURED: (Vid, Pid) = (Vid(0x1d50), Pid(0x60b5));
pub const ATLYS_TEST: (Vid, Pid) = (Vid(0x1d50), Pid(0x60b6));
pub const ATLYS_OPERATIONAL: (Vid, Pid) = (Vid(0x1d50), Pid(0x60b7));
/// Exar XR21V1410 USB-UART found next to the Atlys.
pub const EXAR_UART: (Vid, Pid) = (Vid(0x04e2), Pid(0x1410));
/// Cypress FX2 with an empty EEPROM.
pub const CYPRESS_FAILSAFE: (Vid, Pid) = (Vid(0x04b4), Pid(0x8613));
pub const OPSIS_UNCONFIGURED: (Vid, Pid) = (Vid(0x2a19), Pid(0x5440));
pub const OPSIS_TEST: (Vid, Pid) = (Vid(0x2a19), Pid(0x5441));
pub const OPSIS_OPERATIONAL: (Vid, Pid) = (Vid(0x2a19), Pid(0x5442));
/// ixo-usb-jtag, shared between both boards.
pub const IXO_USB_JTAG: (Vid, Pid) = (Vid(0x16c0), Pid(0x06ad));

/// What a USB identity turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification
{
	Board(BoardType, BoardState),
	/// Auxiliary USB-UART adapter that belongs to some board.
	UartAdapter,
	/// Looks like one of ours, but we can't tell which board it is.
	Ignored(IgnoreReason),
	NotABoard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason
{
	UnknownJtagSerial(Option<String>),
	UnknownJtagRevision(Option<DeviceRevision>),
	/// Opsis test firmware revision missing from the table, or not readable yet.
	UnknownOpsisRevision(Option<DeviceRevision>),
}

impl IgnoreReason
{
	/// The board this device must be, when the identity alone says so.
	pub fn board_type(&self) -> Option<BoardType>
	{
		match self {
			Self::UnknownOpsisRevision(_) => Some(BoardType::Opsis),
			Self::UnknownJtagSerial(_) | Self::UnknownJtagRevision(_) => None,
		}
	}
}

impl Display for IgnoreReason
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		match self {
			Self::UnknownJtagSerial(Some(serial)) => write!(f, "ixo-usb-jtag with unknown serial '{}'", serial),
			Self::UnknownJtagSerial(None) => write!(f, "ixo-usb-jtag without a serial number"),
			Self::UnknownJtagRevision(Some(revision)) => write!(f, "ixo-usb-jtag with unknown revision {}", revision),
			Self::UnknownJtagRevision(None) => write!(f, "ixo-usb-jtag without a device revision"),
			Self::UnknownOpsisRevision(Some(revision)) => {
				write!(f, "Opsis test firmware with unknown revision {:04x}", revision.0)
			},
			Self::UnknownOpsisRevision(None) => write!(f, "Opsis test firmware without a device revision"),
		}
	}
}

/// Classify a USB identity. Total over all inputs: anything unrecognised is [Classification::NotABoard],
/// and anything we recognise but can't pin down is [Classification::Ignored].
pub fn classify(vid: Vid, pid: Pid, revision: Option<DeviceRevision>, serial: Option<&str>) -> Classification
{
	use BoardState::*;
	use BoardType::*;

	match (vid, pid) {
		DIGILENT_ADEPT | ATLYS_UNCONFIGURED => Classification::Board(Atlys, Unconfigured),
		ATLYS_TEST => Classification::Board(Atlys, atlys_test_state(revision)),
		ATLYS_OPERATIONAL => Classification::Board(Atlys, Operational),
		EXAR_UART => Classification::UartAdapter,
		CYPRESS_FAILSAFE | OPSIS_UNCONFIGURED => Classification::Board(Opsis, Unconfigured),
		OPSIS_TEST => classify_opsis_test(revision),
		OPSIS_OPERATIONAL => Classification::Board(Opsis, Operational),
		IXO_USB_JTAG => classify_ixo_usb_jtag(revision, serial),
		_ => Classification::NotABoard,
	}
}

fn atlys_test_state(revision: Option<DeviceRevision>) -> BoardState
{
	match revision.map(|rev| rev.0) {
		Some(0x0001) => BoardState::Jtag,
		Some(0x0010) => BoardState::TestJtag,
		Some(0x0011) => BoardState::TestSerial,
		Some(0x0012) => BoardState::TestAudio,
		Some(0x0013) => BoardState::TestUvc,
		_ => BoardState::Unknown,
	}
}

/// A board part way through re-enumerating can show up before its revision is readable, so a
/// missing revision is only worth a debug line. A revision we have never seen is an error.
fn classify_opsis_test(revision: Option<DeviceRevision>) -> Classification
{
	let state = match revision.map(|rev| rev.0) {
		Some(0x0001) => BoardState::Jtag,
		Some(0x0002) => BoardState::Eeprom,
		Some(0x0003) => BoardState::Serial,
		Some(0x0011) => BoardState::TestSerial,
		Some(0x0012) => BoardState::TestAudio,
		Some(0x0013) => BoardState::TestUvc,
		Some(_) => {
			let reason = IgnoreReason::UnknownOpsisRevision(revision);
			error!("Ignoring {}", reason);
			return Classification::Ignored(reason);
		},
		None => {
			let reason = IgnoreReason::UnknownOpsisRevision(None);
			debug!("Ignoring {}", reason);
			return Classification::Ignored(reason);
		},
	};
	Classification::Board(BoardType::Opsis, state)
}

fn classify_ixo_usb_jtag(revision: Option<DeviceRevision>, serial: Option<&str>) -> Classification
{
	match revision.map(|rev| rev.0) {
		Some(0x0001 | 0x0004) => {
			match BoardType::ALL.into_iter().find(|board_type| Some(board_type.jtag_serial()) == serial) {
				Some(board_type) => Classification::Board(board_type, BoardState::Jtag),
				None => {
					let reason = IgnoreReason::UnknownJtagSerial(serial.map(String::from));
					warn!("Ignoring {}", reason);
					Classification::Ignored(reason)
				},
			}
		},
		Some(0xff00) => Classification::Board(BoardType::Opsis, BoardState::Jtag),
		_ => {
			let reason = IgnoreReason::UnknownJtagRevision(revision);
			warn!("Ignoring {}", reason);
			Classification::Ignored(reason)
		},
	}
}
