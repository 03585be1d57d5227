// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Enumeration by running `lsusb` and reading the rest from sysfs. Linux only.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use super::sysfs::{self, SysfsTopology, UnbindHelper};
use super::{Device, Pid, USBFS_ROOT, UsbBackend, UsbPath, Vid};
use crate::error::{ErrorKind, Result};
use crate::tool::{SystemRunner, ToolCommand, ToolRunner};

// 'Bus 002 Device 002: ID 8087:0024 Intel Corp. Integrated Rate Matching Hub'
static LSUSB_LINE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^Bus (?P<bus>[0-9]+) Device (?P<address>[0-9]+): ID (?P<vid>[0-9a-f]+):(?P<pid>[0-9a-f]+)")
		.expect("lsusb line pattern is valid")
});

/// Fields of one line of `lsusb` output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LsusbEntry
{
	pub bus: u8,
	pub address: u8,
	pub vid: Vid,
	pub pid: Pid,
}

pub fn parse_lsusb_line(line: &str) -> Option<LsusbEntry>
{
	let captures = LSUSB_LINE.captures(line)?;
	Some(LsusbEntry {
		bus: captures["bus"].parse().ok()?,
		address: captures["address"].parse().ok()?,
		vid: Vid(u16::from_str_radix(&captures["vid"], 16).ok()?),
		pid: Pid(u16::from_str_radix(&captures["pid"], 16).ok()?),
	})
}

pub struct LsusbBackend
{
	topology: SysfsTopology,
	runner: Box<dyn ToolRunner>,
	usbfs_root: PathBuf,
	helper: Option<UnbindHelper>,
}

impl LsusbBackend
{
	pub fn new(helper: Option<UnbindHelper>) -> Self
	{
		Self::with_parts(SysfsTopology::default(), Box::new(SystemRunner), USBFS_ROOT, helper)
	}

	/// Build against a different sysfs/usbfs root and tool runner.
	pub fn with_parts<P: Into<PathBuf>>(
		topology: SysfsTopology, runner: Box<dyn ToolRunner>, usbfs_root: P, helper: Option<UnbindHelper>,
	) -> Self
	{
		Self {
			topology,
			runner,
			usbfs_root: usbfs_root.into(),
			helper,
		}
	}

	fn usbfs_root(&self) -> &Path
	{
		&self.usbfs_root
	}
}

impl UsbBackend for LsusbBackend
{
	fn name(&self) -> &'static str
	{
		"lsusb"
	}

	fn enumerate(&mut self) -> Result<Vec<Device>>
	{
		self.topology.clear();

		let command = ToolCommand::new("lsusb");
		let output = self.runner.run(&command).map_err(|e| match e.kind() {
			ErrorKind::ToolUnavailable { .. } => ErrorKind::Enumeration("lsusb is not installed".into()).error_from(e),
			_ => e,
		})?;
		if !output.success() {
			return Err(ErrorKind::Enumeration(format!("lsusb exited with {:?}", output.exit_code)).error());
		}

		let mut devices = Vec::new();
		for line in output.output.lines().filter(|line| !line.trim().is_empty()) {
			let Some(entry) = parse_lsusb_line(line) else {
				warn!("Unexpected lsusb output: {:?}", line);
				continue;
			};
			let path = match UsbPath::existing(self.usbfs_root(), entry.bus, entry.address) {
				Ok(path) => path,
				Err(e) => {
					debug!("Skipping {:?}: {}", line, e);
					continue;
				},
			};

			let aux_paths = self.topology.resolve_aux(path)?;
			let (revision, serial_number) = sysfs::revision_and_serial(&aux_paths)?;
			devices.push(Device {
				path,
				vid: entry.vid,
				pid: entry.pid,
				revision,
				serial_number,
				aux_paths,
			});
		}

		Ok(devices)
	}

	fn drivers(&self, device: &Device) -> Result<Vec<String>>
	{
		sysfs::drivers(&device.aux_paths)
	}

	fn detach(&self, device: &Device) -> Result<()>
	{
		sysfs::detach(device, self.helper.as_ref(), self.runner.as_ref())
	}

	fn tty_paths(&self, device: &Device) -> Result<Vec<PathBuf>>
	{
		sysfs::tty_nodes(&device.aux_paths)
	}
}
