// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Reflashing the FX2 EEPROM by way of a DFU bootloader loaded into FX2 RAM.
//!
//! The bootloader comes up as a brand new USB device, so we recognise it by position: the board's
//! sysfs directory stays put while its usbfs slot changes.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use super::{LoadContext, detach_board_drivers, fx2};
use crate::board::{Board, BoardState};
use crate::error::{ErrorKind, Result};
use crate::firmware_file::{DfuImage, FirmwareImage};
use crate::tool::{ToolCommand, ToolFailure};
use crate::usb::{Device, UsbPath};

pub const DFU_BOOTLOADER: &str = "boot-dfu.ihex";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfuWait
{
	pub timeout: Duration,
	pub poll_interval: Duration,
}

impl Default for DfuWait
{
	fn default() -> Self
	{
		Self {
			timeout: Duration::from_secs(3),
			poll_interval: Duration::from_millis(100),
		}
	}
}

/// Is `device` the bootloader that replaced the device at `previous_path`/`previous_sysfs`?
pub fn is_bootloader(device: &Device, previous_sysfs: &Path, previous_path: UsbPath) -> bool
{
	device.path != previous_path && device.aux_paths.iter().any(|dir| dir == previous_sysfs)
}

/// Load the DFU bootloader (or `firmware`, if given) and wait for it to enumerate.
pub fn load_dfu_bootloader(ctx: &mut LoadContext, board: &Board, firmware: Option<&Path>, wait: DfuWait)
-> Result<Board>
{
	let previous_sysfs: PathBuf = board
		.device
		.sysfs_path()
		.ok_or_else(|| ErrorKind::BoardNotReady {
			board_type: board.board_type,
			reason: "no sysfs entry to recognise the bootloader by".into(),
		}
		.error())?
		.to_path_buf();
	let previous_path = board.device.path;

	let firmware = firmware.map_or_else(|| board.board_type.fx2_image(DFU_BOOTLOADER), Path::to_path_buf);
	fx2::load_fx2(ctx, board, &firmware)?;

	let started = Instant::now();
	let found = loop {
		let found: Vec<Device> = ctx
			.backend
			.enumerate()?
			.into_iter()
			.filter(|device| is_bootloader(device, &previous_sysfs, previous_path))
			.collect();
		if !found.is_empty() || started.elapsed() >= wait.timeout {
			break found;
		}
		thread::sleep(wait.poll_interval);
	};

	let mut found = found.into_iter();
	match (found.next(), found.next()) {
		(Some(device), None) => {
			info!("DFU bootloader is up at {}", device.path);
			Ok(Board::new(device, board.board_type, BoardState::DfuBoot))
		},
		(None, _) => Err(ErrorKind::Timeout {
			board_type: board.board_type,
			target: BoardState::DfuBoot,
			waited: started.elapsed(),
		}
		.error()
		.with_ctx("waiting for the DFU bootloader")),
		(Some(_), Some(_)) => Err(ErrorKind::TooManyDevices.error().with_ctx("looking for the DFU bootloader")),
	}
}

/// Write a `.dfu` image to the FX2 EEPROM through a running DFU bootloader.
pub fn flash_fx2_dfu(ctx: &LoadContext, board: &Board, firmware: &Path) -> Result<()>
{
	let path = ctx.locator.locate(firmware)?;
	let image = DfuImage::from_path(&path)?;
	debug!("DFU image for {:04x}:{:04x}, {} bytes", image.vid, image.pid, image.payload_len);

	detach_board_drivers(ctx, board)?;

	info!("Using FX2 firmware {}", firmware.display());
	let mut command = ToolCommand::new("dfu-util")
		.arg("-D")
		.path_arg(&path)
		.search_path("/usr/sbin")
		.search_path("/sbin");
	if ctx.verbosity > 0 {
		command = command.arg("-v");
	}
	info!("Running {}", command);

	let output = ctx.runner.run(&command)?;
	if output.success() {
		Ok(())
	} else {
		Err(ErrorKind::RetryableTool(ToolFailure::new("dfu-util failed to flash the FX2", &command, &output)).error())
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::usb::{Pid, Vid};

	fn device(address: u8, aux: &[&str]) -> Device
	{
		Device {
			path: UsbPath::new(1, address),
			vid: Vid(0x2a19),
			pid: Pid(0x5441),
			revision: None,
			serial_number: None,
			aux_paths: aux.iter().map(PathBuf::from).collect(),
		}
	}

	#[test]
	fn bootloader_is_recognised_by_position_and_new_address()
	{
		let sysfs = Path::new("/sys/bus/usb/devices/1-1.2");
		let old = UsbPath::new(1, 7);

		assert!(is_bootloader(&device(8, &["/sys/bus/usb/devices/1-1.2", "/sys/bus/usb/devices/1-1.2:1.0"]), sysfs, old));
		// Same slot: the old device has not gone away yet.
		assert!(!is_bootloader(&device(7, &["/sys/bus/usb/devices/1-1.2"]), sysfs, old));
		// Somewhere else entirely.
		assert!(!is_bootloader(&device(9, &["/sys/bus/usb/devices/1-1.3"]), sysfs, old));
	}
}
