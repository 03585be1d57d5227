// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

mod common;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::Result;
use hdmi2usb_modeswitch::board::{Board, BoardState, BoardType};
use hdmi2usb_modeswitch::error::ErrorKind;
use hdmi2usb_modeswitch::locator::FirmwareLocator;
use hdmi2usb_modeswitch::session::Session;
use hdmi2usb_modeswitch::switcher::{BoardScanner, Fx2Loader, ModeSwitcher, SwitchOptions};
use hdmi2usb_modeswitch::usb::UsbPath;

use crate::common::{FakeBackend, FirmwareTree, RecordingRunner, device};

const QUICK: SwitchOptions = SwitchOptions {
	poll_interval: Duration::ZERO,
	show_progress: false,
};

/// Scripted host: hands out queued scans and remembers what it was asked to load.
#[derive(Default)]
struct ScriptedHost
{
	scans: VecDeque<Vec<Board>>,
	scan_count: usize,
	loaded: Vec<PathBuf>,
}

impl BoardScanner for ScriptedHost
{
	fn scan(&mut self) -> hdmi2usb_modeswitch::error::Result<Vec<Board>>
	{
		self.scan_count += 1;
		Ok(self.scans.pop_front().unwrap_or_default())
	}
}

impl Fx2Loader for ScriptedHost
{
	fn load_fx2(&mut self, _board: &Board, firmware: &Path) -> hdmi2usb_modeswitch::error::Result<()>
	{
		self.loaded.push(firmware.to_path_buf());
		Ok(())
	}
}

fn opsis(state: BoardState, revision: Option<u16>, address: u8) -> Board
{
	let pid = if state == BoardState::Unconfigured { 0x5440 } else { 0x5441 };
	Board::new(device(0x2a19, pid, revision, address, "1-2"), BoardType::Opsis, state)
}

#[test]
fn opsis_unconfigured_to_jtag() -> Result<()>
{
	let old = opsis(BoardState::Unconfigured, None, 5);
	let mut host = ScriptedHost {
		scans: VecDeque::from([
			vec![old.clone()],
			vec![old.clone()],
			vec![opsis(BoardState::Jtag, Some(0x0001), 6)],
		]),
		..Default::default()
	};

	let board = ModeSwitcher::new(&mut host, QUICK).switch_mode(old, BoardState::Jtag, Some(Duration::from_secs(5)))?;
	assert_eq!(board.state, BoardState::Jtag);
	assert_eq!(board.device.path, UsbPath::new(1, 6));
	assert_eq!(host.loaded, vec![PathBuf::from("fx2/opsis/ixo-usb-jtag.hex")]);
	assert_eq!(host.scan_count, 3);
	Ok(())
}

#[test]
fn switching_to_the_current_mode_loads_nothing() -> Result<()>
{
	let mut host = ScriptedHost::default();
	let board = opsis(BoardState::Jtag, Some(0x0001), 6);
	let same = ModeSwitcher::new(&mut host, QUICK).switch_mode(board.clone(), BoardState::Jtag, None)?;
	assert_eq!(same, board);
	assert!(host.loaded.is_empty());
	assert_eq!(host.scan_count, 0);
	Ok(())
}

#[test]
fn illegal_transitions_are_refused_before_loading()
{
	let mut host = ScriptedHost::default();
	let atlys = Board::new(device(0x1d50, 0x60b5, None, 3, "2-1"), BoardType::Atlys, BoardState::Unconfigured);
	let err = ModeSwitcher::new(&mut host, QUICK)
		.switch_mode(atlys, BoardState::Serial, None)
		.expect_err("the Atlys has no serial firmware");
	assert!(matches!(err.kind(), ErrorKind::UnsupportedTransition { .. }));
	assert!(host.loaded.is_empty());
}

#[test]
fn gives_up_after_the_timeout()
{
	let old = opsis(BoardState::Unconfigured, None, 5);
	let mut host = ScriptedHost {
		scans: VecDeque::from(vec![vec![old.clone()]; 3]),
		..Default::default()
	};
	let err = ModeSwitcher::new(&mut host, QUICK)
		.switch_mode(old, BoardState::Serial, Some(Duration::ZERO))
		.expect_err("board never comes back");
	assert!(matches!(err.kind(), ErrorKind::Timeout {
		target: BoardState::Serial,
		..
	}));
	assert_eq!(host.scan_count, 1);
}

#[test]
fn unexpected_mode_is_an_error()
{
	let old = opsis(BoardState::Unconfigured, None, 5);
	let mut host = ScriptedHost {
		scans: VecDeque::from([vec![opsis(BoardState::Eeprom, Some(0x0002), 6)]]),
		..Default::default()
	};
	let err = ModeSwitcher::new(&mut host, QUICK)
		.switch_mode(old, BoardState::Jtag, None)
		.expect_err("came back in eeprom mode");
	assert!(matches!(err.kind(), ErrorKind::UnexpectedState {
		observed: BoardState::Eeprom,
		..
	}));
}

#[test]
fn session_switches_through_fxload() -> Result<()>
{
	let firmware = FirmwareTree::new()?.with_fx2_images()?;
	let unconfigured = device(0x2a19, 0x5440, None, 5, "1-2");
	let jtag = device(0x2a19, 0x5441, Some(0x0001), 6, "1-2");
	let backend = FakeBackend::new(vec![
		vec![unconfigured.clone()],
		vec![unconfigured.clone()],
		vec![unconfigured],
		vec![jtag],
	]);
	let enumerations = backend.enumerations();
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let mut session = Session::new(Box::new(backend), Box::new(runner.clone()), locator);

	let board = session.find_boards()?.pop_single("--mode")?;
	assert_eq!(board.state, BoardState::Unconfigured);

	let board = ModeSwitcher::new(&mut session, QUICK).switch_mode(board, BoardState::Jtag, Some(Duration::from_secs(5)))?;
	assert_eq!(board.state, BoardState::Jtag);
	assert_eq!(*enumerations.borrow(), 4);

	let calls = runner.calls();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].program(), "fxload");
	assert!(calls[0].arguments().contains(&"/dev/bus/usb/001/005".to_string()));
	let image = calls[0].arguments().last().map(PathBuf::from).unwrap_or_default();
	assert!(image.ends_with("fx2/opsis/ixo-usb-jtag.hex"), "{}", image.display());
	Ok(())
}

#[test]
fn half_enumerated_opsis_keeps_the_switch_polling() -> Result<()>
{
	let firmware = FirmwareTree::new()?.with_fx2_images()?;
	let unconfigured = device(0x2a19, 0x5440, None, 5, "1-2");
	let backend = FakeBackend::new(vec![
		vec![unconfigured.clone()],
		vec![unconfigured.clone()],
		vec![unconfigured],
		vec![device(0x2a19, 0x5441, None, 6, "1-2")],
		vec![device(0x2a19, 0x5441, Some(0x0001), 6, "1-2")],
	]);
	let enumerations = backend.enumerations();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let mut session = Session::new(Box::new(backend), Box::new(RecordingRunner::default()), locator);

	let board = session.find_boards()?.pop_single("--mode")?;
	let board = ModeSwitcher::new(&mut session, QUICK).switch_mode(board, BoardState::Jtag, Some(Duration::from_secs(5)))?;
	assert_eq!(board.state, BoardState::Jtag);
	assert_eq!(board.device.revision.map(|rev| rev.0), Some(0x0001));
	assert_eq!(*enumerations.borrow(), 5);
	Ok(())
}
