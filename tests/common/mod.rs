// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use hdmi2usb_modeswitch::error::Result;
use hdmi2usb_modeswitch::tool::{ToolCommand, ToolOutput, ToolRunner};
use hdmi2usb_modeswitch::usb::{Device, DeviceRevision, Pid, UsbBackend, UsbPath, Vid};
use tempfile::TempDir;

pub fn device(vid: u16, pid: u16, revision: Option<u16>, address: u8, port: &str) -> Device
{
	Device {
		path: UsbPath::new(1, address),
		vid: Vid(vid),
		pid: Pid(pid),
		revision: revision.map(DeviceRevision),
		serial_number: None,
		aux_paths: vec![
			PathBuf::from("/sys/bus/usb/devices").join(port),
			PathBuf::from("/sys/bus/usb/devices").join(format!("{}:1.0", port)),
		],
	}
}

/// Plays back a fixed series of enumerations, repeating the last one forever.
pub struct FakeBackend
{
	scans: VecDeque<Vec<Device>>,
	last: Vec<Device>,
	enumerations: Rc<RefCell<usize>>,
}

impl FakeBackend
{
	pub fn new(scans: Vec<Vec<Device>>) -> Self
	{
		Self {
			scans: scans.into(),
			last: Vec::new(),
			enumerations: Rc::default(),
		}
	}

	/// Shared count of `enumerate()` calls, still readable once the backend has been boxed.
	pub fn enumerations(&self) -> Rc<RefCell<usize>>
	{
		Rc::clone(&self.enumerations)
	}
}

impl UsbBackend for FakeBackend
{
	fn name(&self) -> &'static str
	{
		"fake"
	}

	fn enumerate(&mut self) -> Result<Vec<Device>>
	{
		*self.enumerations.borrow_mut() += 1;
		if let Some(scan) = self.scans.pop_front() {
			self.last = scan;
		}
		Ok(self.last.clone())
	}

	fn drivers(&self, _device: &Device) -> Result<Vec<String>>
	{
		Ok(Vec::new())
	}

	fn detach(&self, _device: &Device) -> Result<()>
	{
		Ok(())
	}

	fn tty_paths(&self, _device: &Device) -> Result<Vec<PathBuf>>
	{
		Ok(Vec::new())
	}
}

/// Records every command and answers with canned outputs, then with a clean exit.
#[derive(Clone, Default)]
pub struct RecordingRunner
{
	calls: Rc<RefCell<Vec<ToolCommand>>>,
	responses: Rc<RefCell<VecDeque<ToolOutput>>>,
}

impl RecordingRunner
{
	pub fn respond(&self, exit_code: i32, output: &str)
	{
		self.responses.borrow_mut().push_back(ToolOutput {
			exit_code: Some(exit_code),
			output: output.into(),
		});
	}

	pub fn calls(&self) -> Vec<ToolCommand>
	{
		self.calls.borrow().clone()
	}
}

impl ToolRunner for RecordingRunner
{
	fn run(&self, command: &ToolCommand) -> Result<ToolOutput>
	{
		self.calls.borrow_mut().push(command.clone());
		Ok(self.responses.borrow_mut().pop_front().unwrap_or(ToolOutput {
			exit_code: Some(0),
			output: String::new(),
		}))
	}
}

/// A firmware directory on disk.
pub struct FirmwareTree
{
	dir: TempDir,
}

impl FirmwareTree
{
	pub fn new() -> std::io::Result<Self>
	{
		Ok(Self {
			dir: tempfile::tempdir()?,
		})
	}

	pub fn path(&self) -> &Path
	{
		self.dir.path()
	}

	pub fn add<P: AsRef<Path>>(&self, name: P, contents: &[u8]) -> std::io::Result<PathBuf>
	{
		let path = self.dir.path().join(name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(&path, contents)?;
		Ok(path)
	}

	/// Every FX2 image the mode switcher might ask for, for both boards.
	pub fn with_fx2_images(self) -> std::io::Result<Self>
	{
		for board in ["atlys", "opsis"] {
			for file in ["ixo-usb-jtag.hex", "usb-uart.ihx", "eeprom.ihx", "boot-dfu.ihex"] {
				self.add(format!("fx2/{}/{}", board, file), INTEL_HEX)?;
			}
		}
		Ok(self)
	}
}

pub const INTEL_HEX: &[u8] = b":0300000002003EBD\n:03000B000204628A\n:00000001FF\n";

/// A `.bit` header claiming to be for `part`.
pub fn bitstream(part: &str) -> Vec<u8>
{
	let mut data = vec![0x00, 0x09, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x00, 0x00, 0x01];
	for (key, value) in [(b'a', "top.ncd;UserID=0xFFFFFFFF"), (b'b', part), (b'c', "2016/11/02"), (b'd', "18:21:52")] {
		data.push(key);
		data.extend_from_slice(&((value.len() + 1) as u16).to_be_bytes());
		data.extend_from_slice(value.as_bytes());
		data.push(0);
	}
	data.push(b'e');
	data.extend_from_slice(&8u32.to_be_bytes());
	data.extend_from_slice(&[0xff; 8]);
	data
}
