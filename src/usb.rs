// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};

use crate::error::{ErrorKind, Result};

pub mod lsusb;
pub mod native;
pub mod sysfs;

pub use self::lsusb::LsusbBackend;
pub use self::native::NativeBackend;
pub use self::sysfs::{SysfsTopology, UnbindHelper};

/// Where usbfs device nodes live on Linux.
pub const USBFS_ROOT: &str = "/dev/bus/usb";

/// Simple newtype struct for some clarity in function arguments and whatnot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vid(pub u16);

/// Simple newtype struct for some clarity in function arguments and whatnot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u16);

impl Display for Vid
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{:04x}", self.0)
	}
}

impl Display for Pid
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{:04x}", self.0)
	}
}

/// The `bcdDevice` field of a device descriptor. Our FX2 firmwares use it to say which mode they're in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceRevision(pub u16);

impl Display for DeviceRevision
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{:04x}", self.0)
	}
}

impl FromStr for DeviceRevision
{
	type Err = std::num::ParseIntError;

	/// Parses the four hex digit form sysfs uses for `bcdDevice`.
	fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
	{
		u16::from_str_radix(s.trim(), 16).map(Self)
	}
}

/// A device's current slot in the OS enumeration. Only meaningful until the device next resets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsbPath
{
	pub bus: u8,
	pub address: u8,
}

impl UsbPath
{
	/// Construct without checking the device node; for use when the caller just saw the device.
	pub fn new(bus: u8, address: u8) -> Self
	{
		Self {
			bus,
			address,
		}
	}

	/// Construct, checking that the device node currently exists under `usbfs_root`.
	pub fn existing(usbfs_root: &Path, bus: u8, address: u8) -> Result<Self>
	{
		let path = Self::new(bus, address);
		let node = path.node_in(usbfs_root);
		if node.exists() {
			Ok(path)
		} else {
			Err(ErrorKind::Enumeration(format!("{} does not exist", node.display())).error())
		}
	}

	fn node_in(&self, usbfs_root: &Path) -> PathBuf
	{
		usbfs_root.join(format!("{:03}", self.bus)).join(format!("{:03}", self.address))
	}

	/// The usbfs device node, as passed to `fxload -D`.
	pub fn usbfs_path(&self) -> PathBuf
	{
		self.node_in(Path::new(USBFS_ROOT))
	}
}

impl Display for UsbPath
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{}/{:03}/{:03}", USBFS_ROOT, self.bus, self.address)
	}
}

/// A device's physical position in the USB topology, e.g. `3-1.2` (bus 3, root port 1, hub port 2).
///
/// Unlike a [UsbPath] this survives the device resetting, as long as nobody moves the cable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(String);

impl PortId
{
	/// Take the port from a sysfs device directory name. Root hubs (`usb1`) have no port.
	pub fn from_sysfs_path(path: &Path) -> Option<Self>
	{
		path.file_name()?.to_str()?.parse().ok()
	}

	pub fn as_str(&self) -> &str
	{
		&self.0
	}
}

impl FromStr for PortId
{
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
	{
		let invalid = || format!("'{}' is not a USB port like 3-1.2", s);
		let (bus, ports) = s.split_once('-').ok_or_else(invalid)?;
		let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
		if numeric(bus) && ports.split('.').all(numeric) {
			Ok(Self(s.into()))
		} else {
			Err(invalid())
		}
	}
}

impl Display for PortId
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		f.write_str(&self.0)
	}
}

/// One USB device as seen at one enumeration instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device
{
	pub path: UsbPath,
	pub vid: Vid,
	pub pid: Pid,
	pub revision: Option<DeviceRevision>,
	pub serial_number: Option<String>,
	/// sysfs directories belonging to the device: its own first, then its interfaces.
	pub aux_paths: Vec<PathBuf>,
}

impl Device
{
	pub fn sysfs_path(&self) -> Option<&Path>
	{
		self.aux_paths.first().map(PathBuf::as_path)
	}

	pub fn port(&self) -> Option<PortId>
	{
		PortId::from_sysfs_path(self.sysfs_path()?)
	}
}

impl Display for Device
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{}:{}", self.vid, self.pid)?;
		match self.revision {
			Some(revision) => write!(f, " rev {}", revision)?,
			None => write!(f, " rev ????")?,
		}
		if let Some(serial) = &self.serial_number {
			write!(f, " serial {}", serial)?;
		}
		write!(f, " at {}", self.path)
	}
}

/// A way of listing USB devices and poking at their kernel drivers.
pub trait UsbBackend
{
	fn name(&self) -> &'static str;

	/// List everything currently attached. Starts a fresh pass: nothing cached by a previous call
	/// is reused.
	fn enumerate(&mut self) -> Result<Vec<Device>>;

	/// Names of the kernel drivers bound to the device's interfaces.
	fn drivers(&self, device: &Device) -> Result<Vec<String>>;

	fn in_use(&self, device: &Device) -> Result<bool>
	{
		Ok(!self.drivers(device)?.is_empty())
	}

	/// Unbind every kernel driver from the device's interfaces.
	fn detach(&self, device: &Device) -> Result<()>;

	/// Serial device nodes (`/dev/ttyACM0`...) provided by the device.
	fn tty_paths(&self, device: &Device) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BackendChoice
{
	/// Native library if it works here, otherwise `lsusb`.
	#[default]
	Auto,
	Native,
	Lsusb,
}

impl FromStr for BackendChoice
{
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
	{
		match s {
			"auto" => Ok(Self::Auto),
			"native" | "libusb" => Ok(Self::Native),
			"lsusb" => Ok(Self::Lsusb),
			other => Err(format!("unknown USB backend '{}'", other)),
		}
	}
}

/// Open the requested enumeration backend.
pub fn open_backend(choice: BackendChoice, helper: Option<UnbindHelper>) -> Result<Box<dyn UsbBackend>>
{
	match choice {
		BackendChoice::Native => Ok(Box::new(NativeBackend::new(helper))),
		BackendChoice::Lsusb => Ok(Box::new(LsusbBackend::new(helper))),
		BackendChoice::Auto => match NativeBackend::check_available() {
			Ok(()) => Ok(Box::new(NativeBackend::new(helper))),
			Err(e) => {
				warn!("Native USB enumeration unavailable, falling back to lsusb: {}", e);
				Ok(Box::new(LsusbBackend::new(helper)))
			},
		},
	}
}

/// One way the two backends disagreed about a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendMismatch
{
	pub path: UsbPath,
	pub field: &'static str,
	pub native: String,
	pub os_tool: String,
}

/// Compare two simultaneous enumerations. Devices only one side saw are skipped, as are
/// revision and serial when either side could not read them.
pub fn compare_backends(native: &[Device], os_tool: &[Device]) -> Vec<BackendMismatch>
{
	let os_by_path: BTreeMap<UsbPath, &Device> = os_tool.iter().map(|device| (device.path, device)).collect();
	let mut mismatches = Vec::new();

	for ours in native {
		let Some(theirs) = os_by_path.get(&ours.path) else {
			debug!("{} only seen by the native backend", ours.path);
			continue;
		};
		let mut check = |field: &'static str, a: String, b: String| {
			if a != b {
				mismatches.push(BackendMismatch {
					path: ours.path,
					field,
					native: a,
					os_tool: b,
				});
			}
		};

		check("vid", ours.vid.to_string(), theirs.vid.to_string());
		check("pid", ours.pid.to_string(), theirs.pid.to_string());
		if let (Some(a), Some(b)) = (ours.revision, theirs.revision) {
			check("revision", a.to_string(), b.to_string());
		}
		if let (Some(a), Some(b)) = (&ours.serial_number, &theirs.serial_number) {
			check("serial", a.clone(), b.clone());
		}
	}

	mismatches
}
