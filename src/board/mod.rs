// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! The boards this tool knows how to drive, the states their firmware can put them in, and the
//! per-board facts (FPGA part, OpenOCD config, flash layout) the loaders need.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use clap::builder::PossibleValue;
use log::{debug, trace};

use self::classify::{Classification, IgnoreReason, classify};
use crate::error::{ErrorKind, Result};
use crate::usb::{Device, PortId, UsbBackend};

pub mod classify;

/// Physical board families.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoardType
{
	Atlys,
	Opsis,
}

impl BoardType
{
	pub const ALL: [Self; 2] = [Self::Atlys, Self::Opsis];

	/// Short lowercase name, as used in firmware paths and on the command line.
	pub fn name(self) -> &'static str
	{
		match self {
			Self::Atlys => "atlys",
			Self::Opsis => "opsis",
		}
	}

	pub fn human_name(self) -> &'static str
	{
		match self {
			Self::Atlys => "Digilent Atlys",
			Self::Opsis => "Numato Opsis",
		}
	}

	/// Spartan-6 part string as found in the `b` record of a bitstream header.
	pub fn fpga_part(self) -> &'static str
	{
		match self {
			Self::Atlys => "6slx45csg324",
			Self::Opsis => "6slx45tfgg484",
		}
	}

	pub fn openocd_config(self) -> &'static str
	{
		match self {
			Self::Atlys => "board/digilent_atlys.cfg",
			Self::Opsis => "board/numato_opsis.cfg",
		}
	}

	/// Location of the JTAG-to-SPI proxy bitstream, relative to the firmware directory.
	pub fn flash_proxy(self) -> PathBuf
	{
		let proxy = match self {
			Self::Atlys => "bscan_spi_xc6slx45.bit",
			Self::Opsis => "bscan_spi_xc6slx45t.bit",
		};
		["spartan6", self.name(), proxy].iter().collect()
	}

	pub fn flash_layout(self) -> FlashLayout
	{
		// Both boards carry the same SPI flash map.
		FlashLayout {
			gateware: 0x0,
			bios: 0x20_0000,
			firmware: 0x20_8000,
		}
	}

	/// Serial number the ixo-usb-jtag firmware reports when running on this board.
	pub fn jtag_serial(self) -> &'static str
	{
		match self {
			Self::Atlys => "hw_nexys",
			Self::Opsis => "hw_opsis",
		}
	}

	/// Path of an FX2 image for this board, relative to the firmware directory.
	pub fn fx2_image(self, file: &str) -> PathBuf
	{
		["fx2", self.name(), file].iter().collect()
	}
}

impl Display for BoardType
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		f.write_str(self.name())
	}
}

impl FromStr for BoardType
{
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
	{
		Self::ALL
			.into_iter()
			.find(|board_type| board_type.name() == s)
			.ok_or_else(|| format!("unknown board type '{}'", s))
	}
}

impl ValueEnum for BoardType
{
	fn value_variants<'a>() -> &'a [Self]
	{
		&Self::ALL
	}

	fn to_possible_value(&self) -> Option<PossibleValue>
	{
		Some(PossibleValue::new(self.name()).help(self.human_name()))
	}
}

/// Where in the SPI flash each kind of image lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlashLayout
{
	pub gateware: u32,
	pub bios: u32,
	pub firmware: u32,
}

/// Operating state of a board, as implied by the identity its current firmware presents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BoardState
{
	/// Nothing of ours loaded yet (vendor or failsafe firmware).
	Unconfigured,
	Jtag,
	Serial,
	Eeprom,
	/// HDMI2USB gateware and firmware running.
	Operational,
	TestJtag,
	TestSerial,
	TestAudio,
	TestUvc,
	/// A test firmware we don't recognise the revision of.
	Unknown,
	/// Running the FX2 DFU bootloader, waiting for `dfu-util`.
	DfuBoot,
}

impl BoardState
{
	pub fn name(self) -> &'static str
	{
		match self {
			Self::Unconfigured => "unconfigured",
			Self::Jtag => "jtag",
			Self::Serial => "serial",
			Self::Eeprom => "eeprom",
			Self::Operational => "operational",
			Self::TestJtag => "test-jtag",
			Self::TestSerial => "test-serial",
			Self::TestAudio => "test-audio",
			Self::TestUvc => "test-uvc",
			Self::Unknown => "test-???",
			Self::DfuBoot => "dfu-boot",
		}
	}
}

impl Display for BoardState
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		f.write_str(self.name())
	}
}

impl ValueEnum for BoardState
{
	/// Only the states a user can ask for with `--mode`.
	fn value_variants<'a>() -> &'a [Self]
	{
		&[Self::Unconfigured, Self::Jtag, Self::Serial, Self::Eeprom, Self::Operational]
	}

	fn to_possible_value(&self) -> Option<PossibleValue>
	{
		Some(PossibleValue::new(self.name()))
	}
}

/// A classified board at one enumeration instant. Rebuilt on every scan and never updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board
{
	pub device: Device,
	pub board_type: BoardType,
	pub state: BoardState,
	/// Separate USB-UART adapter wired to this board's serial port (Atlys).
	pub uart: Option<Device>,
}

impl Board
{
	pub fn new(device: Device, board_type: BoardType, state: BoardState) -> Self
	{
		Self {
			device,
			board_type,
			state,
			uart: None,
		}
	}

	pub fn port(&self) -> Option<PortId>
	{
		self.device.port()
	}

	/// Serial devices usable to talk to this board, best first.
	pub fn tty_paths(&self, backend: &dyn UsbBackend, prefer_hardware_serial: bool) -> Result<Vec<PathBuf>>
	{
		let board_ttys = backend.tty_paths(&self.device)?;
		let uart_ttys = match &self.uart {
			Some(uart) => backend.tty_paths(uart)?,
			None => Vec::new(),
		};
		Ok(effective_ttys(board_ttys, uart_ttys, prefer_hardware_serial))
	}
}

impl Display for Board
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		write!(f, "{} in {} mode ({})", self.board_type.human_name(), self.state, self.device)
	}
}

/// Combine a board's own tty nodes with those of its associated USB-UART adapter.
pub fn effective_ttys(board_ttys: Vec<PathBuf>, uart_ttys: Vec<PathBuf>, prefer_hardware_serial: bool)
-> Vec<PathBuf>
{
	let (mut first, second) = if prefer_hardware_serial {
		(uart_ttys, board_ttys)
	} else {
		(board_ttys, uart_ttys)
	};
	first.extend(second);
	first
}

/// Everything one enumeration pass found.
#[derive(Debug, Clone, Default)]
pub struct BoardScan
{
	pub boards: Vec<Board>,
	/// Devices that looked like ours but could not be pinned to a board.
	pub ignored: Vec<(Device, IgnoreReason)>,
}

/// Enumerate and classify everything attached, pairing Atlys boards with their USB-UART adapters.
pub fn find_boards(backend: &mut dyn UsbBackend) -> Result<BoardScan>
{
	let mut scan = BoardScan::default();
	let mut uarts = Vec::new();

	for device in backend.enumerate()? {
		match classify(device.vid, device.pid, device.revision, device.serial_number.as_deref()) {
			Classification::Board(board_type, state) => {
				trace!("{} is a {} in {} mode", device, board_type, state);
				scan.boards.push(Board::new(device, board_type, state));
			},
			Classification::UartAdapter => uarts.push(device),
			Classification::Ignored(reason) => scan.ignored.push((device, reason)),
			Classification::NotABoard => (),
		}
	}

	associate_uarts(&mut scan.boards, uarts)?;
	Ok(scan)
}

/// Attach USB-UART adapters to Atlys boards, first adapter to first board by USB path.
pub fn associate_uarts(boards: &mut [Board], mut uarts: Vec<Device>) -> Result<()>
{
	let mut atlys: Vec<&mut Board> = boards.iter_mut().filter(|board| board.board_type == BoardType::Atlys).collect();
	if uarts.is_empty() || atlys.is_empty() {
		return Ok(());
	}
	if uarts.len() != atlys.len() {
		return Err(ErrorKind::UartAssociation {
			uarts: uarts.len(),
			boards: atlys.len(),
		}
		.error());
	}

	uarts.sort_by_key(|uart| uart.path);
	atlys.sort_by_key(|board| board.device.path);
	for (board, uart) in atlys.into_iter().zip(uarts) {
		debug!("Associating USB-UART at {} with Atlys at {}", uart.path, board.device.path);
		board.uart = Some(uart);
	}
	Ok(())
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::usb::{Pid, UsbPath, Vid};

	fn device(address: u8, vid: u16, pid: u16) -> Device
	{
		Device {
			path: UsbPath::new(1, address),
			vid: Vid(vid),
			pid: Pid(pid),
			revision: None,
			serial_number: None,
			aux_paths: Vec::new(),
		}
	}

	#[test]
	fn uarts_pair_with_atlys_boards_in_path_order() -> color_eyre::eyre::Result<()>
	{
		let mut boards = vec![
			Board::new(device(9, 0x1d50, 0x60b7), BoardType::Atlys, BoardState::Operational),
			Board::new(device(3, 0x2a19, 0x5442), BoardType::Opsis, BoardState::Operational),
			Board::new(device(4, 0x1d50, 0x60b5), BoardType::Atlys, BoardState::Unconfigured),
		];
		associate_uarts(&mut boards, vec![device(12, 0x04e2, 0x1410), device(10, 0x04e2, 0x1410)])?;

		assert_eq!(boards[2].uart.as_ref().map(|uart| uart.path), Some(UsbPath::new(1, 10)));
		assert_eq!(boards[0].uart.as_ref().map(|uart| uart.path), Some(UsbPath::new(1, 12)));
		assert_eq!(boards[1].uart, None);
		Ok(())
	}

	#[test]
	fn uart_count_must_match()
	{
		let mut boards = vec![Board::new(device(9, 0x1d50, 0x60b7), BoardType::Atlys, BoardState::Operational)];
		let err = associate_uarts(&mut boards, vec![device(1, 0x04e2, 0x1410), device(2, 0x04e2, 0x1410)])
			.expect_err("two adapters, one board");
		assert!(matches!(err.kind(), ErrorKind::UartAssociation { uarts: 2, boards: 1 }));

		// Adapters with no Atlys around are simply left alone.
		let mut opsis = vec![Board::new(device(3, 0x2a19, 0x5442), BoardType::Opsis, BoardState::Operational)];
		assert!(associate_uarts(&mut opsis, vec![device(1, 0x04e2, 0x1410)]).is_ok());
	}

	#[test]
	fn names_round_trip()
	{
		for board_type in BoardType::ALL {
			assert_eq!(board_type.name().parse::<BoardType>(), Ok(board_type));
		}
		assert!("nexys".parse::<BoardType>().is_err());
		assert_eq!(BoardState::Unknown.to_string(), "test-???");
		assert_eq!(BoardState::TestUvc.to_string(), "test-uvc");
	}

	#[test]
	fn firmware_locations()
	{
		assert_eq!(BoardType::Opsis.fx2_image("ixo-usb-jtag.hex"), PathBuf::from("fx2/opsis/ixo-usb-jtag.hex"));
		assert_eq!(BoardType::Atlys.flash_proxy(), PathBuf::from("spartan6/atlys/bscan_spi_xc6slx45.bit"));
		assert_eq!(BoardType::Opsis.flash_proxy(), PathBuf::from("spartan6/opsis/bscan_spi_xc6slx45t.bit"));
		assert_eq!(BoardType::Atlys.flash_layout().firmware, 0x20_8000);
	}

	#[test]
	fn hardware_uart_can_go_first()
	{
		let board = vec![PathBuf::from("/dev/ttyACM0")];
		let uart = vec![PathBuf::from("/dev/ttyUSB0")];

		assert_eq!(
			effective_ttys(board.clone(), uart.clone(), false),
			[PathBuf::from("/dev/ttyACM0"), PathBuf::from("/dev/ttyUSB0")]
		);
		assert_eq!(
			effective_ttys(board, uart, true),
			[PathBuf::from("/dev/ttyUSB0"), PathBuf::from("/dev/ttyACM0")]
		);
		assert!(effective_ttys(Vec::new(), Vec::new(), true).is_empty());
	}
}
