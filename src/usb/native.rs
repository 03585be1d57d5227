// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Enumeration through `nusb`. Descriptor fields come straight from the library; driver and tty
//! information still comes from sysfs, where there is one.

use std::path::PathBuf;

use log::trace;
use nusb::DeviceInfo;

use super::sysfs::{self, SysfsTopology, UnbindHelper};
use super::{Device, DeviceRevision, Pid, UsbBackend, UsbPath, Vid};
use crate::error::{ErrorKind, Result};
use crate::tool::SystemRunner;

pub struct NativeBackend
{
	topology: SysfsTopology,
	helper: Option<UnbindHelper>,
}

impl NativeBackend
{
	pub fn new(helper: Option<UnbindHelper>) -> Self
	{
		Self::with_topology(SysfsTopology::default(), helper)
	}

	pub fn with_topology(topology: SysfsTopology, helper: Option<UnbindHelper>) -> Self
	{
		Self {
			topology,
			helper,
		}
	}

	/// Check that the USB library can list devices on this system at all.
	pub fn check_available() -> Result<()>
	{
		list().map(|_| ())
	}

	fn device_from_info(&mut self, info: &DeviceInfo) -> Result<Device>
	{
		let path = UsbPath::new(info.bus_number(), info.device_address());
		Ok(Device {
			path,
			vid: Vid(info.vendor_id()),
			pid: Pid(info.product_id()),
			revision: Some(DeviceRevision(info.device_version())),
			serial_number: info.serial_number().map(String::from),
			aux_paths: self.topology.resolve_aux(path)?,
		})
	}
}

fn list() -> Result<Vec<DeviceInfo>>
{
	nusb::list_devices()
		.map(|devices| devices.collect())
		.map_err(|e| ErrorKind::Enumeration("the USB library could not list devices".into()).error_from(e))
}

impl UsbBackend for NativeBackend
{
	fn name(&self) -> &'static str
	{
		"native"
	}

	fn enumerate(&mut self) -> Result<Vec<Device>>
	{
		self.topology.clear();

		let mut devices = Vec::new();
		for info in list()? {
			trace!("nusb reports {:?}", info);
			devices.push(self.device_from_info(&info)?);
		}
		devices.sort_by_key(|device| device.path);
		Ok(devices)
	}

	fn drivers(&self, device: &Device) -> Result<Vec<String>>
	{
		sysfs::drivers(&device.aux_paths)
	}

	fn detach(&self, device: &Device) -> Result<()>
	{
		sysfs::detach(device, self.helper.as_ref(), &SystemRunner)
	}

	fn tty_paths(&self, device: &Device) -> Result<Vec<PathBuf>>
	{
		sysfs::tty_nodes(&device.aux_paths)
	}
}
