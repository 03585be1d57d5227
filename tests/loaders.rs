// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

mod common;

use std::path::Path;
use std::sync::Mutex;

use color_eyre::eyre::Result;
use hdmi2usb_modeswitch::board::{Board, BoardState, BoardType};
use hdmi2usb_modeswitch::error::ErrorKind;
use hdmi2usb_modeswitch::firmware_file::SYNC_HEADER;
use hdmi2usb_modeswitch::loader::fx2::BENIGN_RELOAD_ERROR;
use hdmi2usb_modeswitch::loader::{LoadContext, fx2, jtag, spi};
use hdmi2usb_modeswitch::locator::FirmwareLocator;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::common::{FakeBackend, FirmwareTree, RecordingRunner, bitstream, device};

/// Log sink that remembers what the user would have been told.
struct CapturingLogger;

static CAPTURED: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());
static LOGGER: CapturingLogger = CapturingLogger;

impl Log for CapturingLogger
{
	fn enabled(&self, _metadata: &Metadata) -> bool
	{
		true
	}

	fn log(&self, record: &Record)
	{
		if let Ok(mut captured) = CAPTURED.lock() {
			captured.push((record.level(), record.args().to_string()));
		}
	}

	fn flush(&self) {}
}

fn capture_logs()
{
	// Only the first call in this test binary installs the logger.
	let _ = log::set_logger(&LOGGER);
	log::set_max_level(LevelFilter::Trace);
}

fn was_logged(level: Level, text: &str) -> bool
{
	CAPTURED
		.lock()
		.map(|captured| captured.iter().any(|(at, message)| *at == level && message.contains(text)))
		.unwrap_or(false)
}

fn opsis_in_jtag_mode() -> Board
{
	Board::new(device(0x2a19, 0x5441, Some(0x0001), 6, "1-2"), BoardType::Opsis, BoardState::Jtag)
}

#[test]
fn bitstream_for_another_part_runs_nothing() -> Result<()>
{
	let firmware = FirmwareTree::new()?;
	firmware.add("atlys.bit", &bitstream(BoardType::Atlys.fpga_part()))?;
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	let err = jtag::load_gateware(&ctx, &opsis_in_jtag_mode(), Path::new("atlys.bit")).expect_err("wrong FPGA");
	assert!(matches!(err.kind(), ErrorKind::MalformedFirmware { reason, .. } if reason.contains("6slx45csg324")));
	assert!(runner.calls().is_empty());
	Ok(())
}

#[test]
fn matching_bitstream_is_loaded_over_jtag() -> Result<()>
{
	let firmware = FirmwareTree::new()?;
	firmware.add("opsis.bit", &bitstream(BoardType::Opsis.fpga_part()))?;
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	jtag::load_gateware(&ctx, &opsis_in_jtag_mode(), Path::new("opsis.bit"))?;
	let calls = runner.calls();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].program(), "openocd");
	assert_eq!(calls[0].arguments()[..2], ["-f", "board/numato_opsis.cfg"]);
	let script = &calls[0].arguments()[3];
	assert!(script.starts_with("init; xc6s_print_dna xc6s.tap; pld load 0 "), "{}", script);
	assert!(script.ends_with("opsis.bit; reset halt; exit"), "{}", script);
	Ok(())
}

#[test]
fn spi_image_without_sync_header_is_rejected() -> Result<()>
{
	let firmware = FirmwareTree::new()?;
	firmware.add("gateware.bin", &[0u8; 64])?;
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	let err = spi::flash_gateware(&ctx, &opsis_in_jtag_mode(), Path::new("gateware.bin")).expect_err("no magic");
	assert!(matches!(err.kind(), ErrorKind::MalformedFirmware { .. }));
	assert!(runner.calls().is_empty());
	Ok(())
}

#[test]
fn spi_flash_goes_through_the_proxy_bitstream() -> Result<()>
{
	let firmware = FirmwareTree::new()?;
	let mut image = SYNC_HEADER.to_vec();
	image.extend_from_slice(&[0x20, 0x00, 0x00, 0x00]);
	firmware.add("gateware.bin", &image)?;
	firmware.add(BoardType::Opsis.flash_proxy(), &bitstream("6slx45tfgg484"))?;
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	spi::flash_gateware(&ctx, &opsis_in_jtag_mode(), Path::new("gateware.bin"))?;
	let calls = runner.calls();
	assert_eq!(calls.len(), 1);
	let script = &calls[0].arguments()[3];
	assert!(script.contains("jtagspi_init 0 "), "{}", script);
	assert!(script.contains("bscan_spi_xc6slx45t.bit; jtagspi_program "), "{}", script);
	assert!(script.ends_with("gateware.bin 0x0; exit"), "{}", script);
	Ok(())
}

#[test]
fn spi_flash_tells_the_user_to_power_cycle() -> Result<()>
{
	capture_logs();
	let firmware = FirmwareTree::new()?;
	let mut image = SYNC_HEADER.to_vec();
	image.extend_from_slice(&[0x20, 0x00, 0x00, 0x00]);
	firmware.add("gateware.bin", &image)?;
	firmware.add(BoardType::Opsis.flash_proxy(), &bitstream("6slx45tfgg484"))?;
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	spi::flash_gateware(&ctx, &opsis_in_jtag_mode(), Path::new("gateware.bin"))?;
	assert!(was_logged(Level::Warn, "will need to be power cycled"));
	Ok(())
}

#[test]
fn jtag_operations_need_jtag_mode() -> Result<()>
{
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	let locator = FirmwareLocator::default();
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	let serial = Board::new(device(0x2a19, 0x5441, Some(0x0003), 6, "1-2"), BoardType::Opsis, BoardState::Serial);
	let err = jtag::reset_gateware(&ctx, &serial).expect_err("serial mode");
	assert!(matches!(err.kind(), ErrorKind::BoardNotReady { .. }));
	assert!(runner.calls().is_empty());
	Ok(())
}

#[test]
fn repeating_dna_pattern_is_retryable_despite_clean_exit()
{
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	runner.respond(
		0,
		"Info : JTAG tap: xc6s.tap tap/device found: 0x44028093\n\
		 DNA = 000110000001100000011000000110000001100000011000000110000 (0x18181818181818)\n",
	);
	let locator = FirmwareLocator::default();
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	let err = jtag::read_dna(&ctx, &opsis_in_jtag_mode()).expect_err("bogus DNA");
	assert!(err.is_retryable());
	assert!(matches!(err.kind(), ErrorKind::RetryableTool(failure) if failure.exit_code == Some(0)));
	assert_eq!(runner.calls().len(), 1);
}

#[test]
fn dna_is_read_over_jtag() -> Result<()>
{
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	runner.respond(0, "DNA = 10010001101000101011001111000100110101011110011011110 (0x123456789abcde)\n");
	let locator = FirmwareLocator::default();
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};

	let dna = jtag::read_dna(&ctx, &opsis_in_jtag_mode())?;
	assert_eq!(dna.to_string(), "0x123456789abcde");
	assert_eq!(runner.calls()[0].arguments()[3], "init; xc6s_print_dna xc6s.tap; exit");
	Ok(())
}

#[test]
fn fxload_reload_complaint_is_benign() -> Result<()>
{
	let firmware = FirmwareTree::new()?.with_fx2_images()?;
	let mut backend = FakeBackend::new(Vec::new());
	let runner = RecordingRunner::default();
	runner.respond(1, &format!("microcontroller type: fx2lp\n{}\n", BENIGN_RELOAD_ERROR));
	runner.respond(1, "unable to open device\n");
	let locator = FirmwareLocator::new(vec![firmware.path().to_path_buf()]);
	let ctx = LoadContext {
		backend: &mut backend,
		runner: &runner,
		locator: &locator,
		verbosity: 0,
	};
	let board = Board::new(device(0x2a19, 0x5440, None, 5, "1-2"), BoardType::Opsis, BoardState::Unconfigured);
	let image = BoardType::Opsis.fx2_image("usb-uart.ihx");

	fx2::load_fx2(&ctx, &board, &image)?;
	let err = fx2::load_fx2(&ctx, &board, &image).expect_err("fxload really failed");
	assert!(err.is_retryable());
	Ok(())
}
