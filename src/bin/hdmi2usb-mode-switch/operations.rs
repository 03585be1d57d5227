// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::{Path, PathBuf};

use hdmi2usb_modeswitch::board::{Board, BoardState};
use hdmi2usb_modeswitch::board_matcher::BoardMatcher;
use hdmi2usb_modeswitch::error::{ErrorKind, Result};
use hdmi2usb_modeswitch::loader::dfu::{self, DfuWait};
use hdmi2usb_modeswitch::loader::{eeprom, fx2, jtag, spi};
use hdmi2usb_modeswitch::locator::FirmwareLocator;
use hdmi2usb_modeswitch::session::Session;
use hdmi2usb_modeswitch::switcher::{ModeSwitcher, SwitchOptions};
use hdmi2usb_modeswitch::tool::SystemRunner;
use hdmi2usb_modeswitch::usb::{UnbindHelper, open_backend};
use log::{debug, info};

use crate::CliArguments;

/// The one thing, besides switching mode, a single invocation does to a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation
{
	LoadFx2Firmware(PathBuf),
	FlashFx2Eeprom(PathBuf),
	LoadGateware(PathBuf),
	FlashGateware(PathBuf),
	ResetGateware,
	FlashBios(PathBuf),
	FlashFirmware(PathBuf),
	ClearFirmware,
	FlashImage(PathBuf),
}

impl Operation
{
	pub fn needs_jtag(&self) -> bool
	{
		!matches!(self, Self::LoadFx2Firmware(_) | Self::FlashFx2Eeprom(_))
	}

	pub fn name(&self) -> &'static str
	{
		match self {
			Self::LoadFx2Firmware(_) => "--load-fx2-firmware",
			Self::FlashFx2Eeprom(_) => "--flash-fx2-eeprom",
			Self::LoadGateware(_) => "--load-gateware",
			Self::FlashGateware(_) => "--flash-gateware",
			Self::ResetGateware => "--reset-gateware",
			Self::FlashBios(_) => "--flash-softcpu-bios",
			Self::FlashFirmware(_) => "--flash-softcpu-firmware",
			Self::ClearFirmware => "--clear-softcpu-firmware",
			Self::FlashImage(_) => "--flash-image",
		}
	}

	pub fn apply(&self, session: &mut Session, board: &Board) -> Result<()>
	{
		match self {
			Self::LoadFx2Firmware(file) => fx2::load_fx2(&session.load_context(), board, file),
			Self::FlashFx2Eeprom(file) => flash_fx2_eeprom(session, board, file),
			Self::LoadGateware(file) => jtag::load_gateware(&session.load_context(), board, file),
			Self::FlashGateware(file) => spi::flash_gateware(&session.load_context(), board, file),
			Self::ResetGateware => jtag::reset_gateware(&session.load_context(), board),
			Self::FlashBios(file) => spi::flash_bios(&session.load_context(), board, file),
			Self::FlashFirmware(file) => spi::flash_firmware(&session.load_context(), board, Some(file)),
			Self::ClearFirmware => spi::clear_firmware(&session.load_context(), board),
			Self::FlashImage(file) => spi::flash_image(&session.load_context(), board, file),
		}
	}
}

/// Boards already running the EEPROM firmware are written directly, anything else goes through
/// the DFU bootloader.
fn flash_fx2_eeprom(session: &mut Session, board: &Board, file: &Path) -> Result<()>
{
	if board.state == BoardState::Eeprom {
		return eeprom::flash_eeprom(board);
	}
	let mut ctx = session.load_context();
	let bootloader = dfu::load_dfu_bootloader(&mut ctx, board, None, DfuWait::default())?;
	dfu::flash_fx2_dfu(&ctx, &bootloader, file)
}

fn describe_boards(session: &Session, boards: &[Board])
{
	for board in boards {
		info!("{}", board);
		for path in &board.device.aux_paths {
			info!("  {}", path.display());
		}
		match session.backend().drivers(&board.device) {
			Ok(drivers) if !drivers.is_empty() => info!("  Board is currently used by drivers {:?}", drivers),
			Ok(_) => (),
			Err(e) => debug!("  Could not read drivers: {}", e),
		}
		if let Ok(ttys) = board.tty_paths(session.backend(), false) {
			if !ttys.is_empty() {
				let ttys: Vec<_> = ttys.iter().map(|tty| tty.display().to_string()).collect();
				info!("  Serial port at {}", ttys.join(", "));
			}
		}
	}
}

fn print_queries(cli_args: &CliArguments, session: &mut Session, board: &Board) -> Result<()>
{
	if cli_args.get_usbfs {
		println!("{}", board.device.path);
	}
	if cli_args.get_sysfs {
		for path in &board.device.aux_paths {
			println!("{}", path.display());
		}
	}
	if cli_args.get_state {
		println!("{}", board.state);
	}
	if cli_args.get_serial_device {
		let ttys = board.tty_paths(session.backend(), cli_args.prefer_hardware_serial)?;
		let tty = ttys.first().ok_or_else(|| {
			ErrorKind::BoardNotReady {
				board_type: board.board_type,
				reason: format!("no serial port in {} mode", board.state),
			}
			.error()
		})?;
		println!("{}", tty.display());
	}
	if cli_args.get_dna {
		println!("{}", jtag::read_dna(&session.load_context(), board)?);
	}
	Ok(())
}

pub fn run(cli_args: &CliArguments) -> color_eyre::Result<()>
{
	let backend = open_backend(cli_args.backend, UnbindHelper::discover())?;
	let mut locator = FirmwareLocator::from_environment();
	if let Some(dir) = &cli_args.firmware_dir {
		locator = locator.with_override(dir.clone());
	}
	let mut session = Session::new(backend, Box::new(SystemRunner), locator)
		.matcher(BoardMatcher::from_params(cli_args))
		.verbosity(cli_args.verbose);

	let mut results = session.find_boards()?;
	describe_boards(&session, &results.found);

	let target = cli_args.target_mode();
	let operation = cli_args.operation();
	if target.is_none() && operation.is_none() && !cli_args.has_query() {
		println!("Found {} boards.", results.found.len());
		return Ok(());
	}

	let boards = if cli_args.all {
		results.pop_all()?
	} else {
		let name = operation.as_ref().map_or("--mode", Operation::name);
		vec![results.pop_single(name)?]
	};

	let timeout = cli_args.timeout()?;
	let options = SwitchOptions {
		show_progress: true,
		..Default::default()
	};
	for board in boards {
		let board = match target {
			Some(target) => ModeSwitcher::new(&mut session, options).switch_mode(board, target, timeout)?,
			None => board,
		};
		if let Some(operation) = &operation {
			operation.apply(&mut session, &board)?;
		}
	}

	if !cli_args.has_query() {
		return Ok(());
	}
	// Operations can change how a board enumerates, so look again before answering questions.
	for board in session.find_boards()?.found {
		print_queries(cli_args, &mut session, &board)?;
	}
	Ok(())
}
