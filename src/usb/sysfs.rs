// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Resolving a device's sysfs directories, and the things we find there: bound drivers, tty nodes
//! and the `unbind` files used to detach drivers.
//!
//! `/sys/bus/usb/devices` holds one entry per device (`1-1.3.1`, or `usb1` for a root hub) and one
//! per interface (`1-1.3.1:1.0`, with root hub interfaces spelled `1-0:1.0`).

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};

use super::{Device, DeviceRevision, UsbPath};
use crate::error::{ErrorKind, Result};
use crate::tool::{SystemRunner, ToolCommand, ToolRunner};

pub const SYSFS_USB_ROOT: &str = "/sys/bus/usb/devices";

/// Map from enumeration slot to sysfs directories, built lazily once per enumeration pass.
#[derive(Debug, Clone)]
pub struct SysfsTopology
{
	root: PathBuf,
	mapping: Option<HashMap<UsbPath, Vec<PathBuf>>>,
}

impl Default for SysfsTopology
{
	fn default() -> Self
	{
		Self::with_root(SYSFS_USB_ROOT)
	}
}

impl SysfsTopology
{
	pub fn with_root<P: Into<PathBuf>>(root: P) -> Self
	{
		Self {
			root: root.into(),
			mapping: None,
		}
	}

	pub fn root(&self) -> &Path
	{
		&self.root
	}

	/// Forget everything learned in the previous pass.
	pub fn clear(&mut self)
	{
		self.mapping = None;
	}

	/// All sysfs directories for the device at `path`, the device's own first. Empty if sysfs
	/// does not know the device (or there is no sysfs on this system).
	pub fn resolve_aux(&mut self, path: UsbPath) -> Result<Vec<PathBuf>>
	{
		if self.mapping.is_none() {
			self.mapping = Some(self.build_mapping()?);
		}

		Ok(self
			.mapping
			.as_ref()
			.and_then(|mapping| mapping.get(&path))
			.cloned()
			.unwrap_or_default())
	}

	fn build_mapping(&self) -> Result<HashMap<UsbPath, Vec<PathBuf>>>
	{
		let mut mapping = HashMap::new();
		let entries = match fs::read_dir(&self.root) {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!("{} does not exist, no sysfs information available", self.root.display());
				return Ok(mapping);
			},
			Err(e) => return Err(ErrorKind::Enumeration(format!("cannot list {}", self.root.display())).error_from(e)),
		};

		let mut names: Vec<String> = entries
			.filter_map(|entry| entry.ok())
			.filter_map(|entry| entry.file_name().into_string().ok())
			.collect();
		names.sort();

		let (interfaces, devices): (Vec<String>, Vec<String>) = names.into_iter().partition(|name| name.contains(':'));

		let mut by_name: HashMap<String, UsbPath> = HashMap::new();
		for name in devices {
			let dir = self.root.join(&name);
			let Some(path) = path_from_sysdir(&dir)? else {
				continue;
			};
			if mapping.insert(path, vec![dir]).is_some() {
				return Err(ErrorKind::Enumeration(format!("two sysfs devices claim {}", path)).error());
			}
			by_name.insert(name, path);
		}

		for name in interfaces {
			let Some(parent) = interface_parent(&name) else {
				continue;
			};
			match by_name.get(&parent).and_then(|path| mapping.get_mut(path)) {
				Some(dirs) => dirs.push(self.root.join(&name)),
				None => warn!("sysfs interface {} has no parent device {}", name, parent),
			}
		}

		trace!("sysfs mapping: {:?}", mapping);
		Ok(mapping)
	}
}

/// Name of the device directory an interface directory belongs to.
fn interface_parent(interface: &str) -> Option<String>
{
	let (device, _) = interface.split_once(':')?;
	match device.strip_suffix("-0") {
		Some(bus) => Some(format!("usb{}", bus)),
		None => Some(device.into()),
	}
}

fn path_from_sysdir(dir: &Path) -> Result<Option<UsbPath>>
{
	let number = |name: &str| -> Result<Option<u8>> {
		let Some(text) = read_attribute(dir, name)? else {
			info!("Skipping {} (no {})", dir.display(), name);
			return Ok(None);
		};
		text.parse().map(Some).map_err(|_| {
			ErrorKind::Enumeration(format!("{}/{} contains '{}'", dir.display(), name, text)).error()
		})
	};

	match (number("busnum")?, number("devnum")?) {
		(Some(bus), Some(address)) => Ok(Some(UsbPath::new(bus, address))),
		_ => Ok(None),
	}
}

/// Read a sysfs attribute file, trimmed. `None` if the attribute is absent.
pub fn read_attribute(dir: &Path, name: &str) -> Result<Option<String>>
{
	match fs::read_to_string(dir.join(name)) {
		Ok(text) => Ok(Some(text.trim().into())),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(ErrorKind::Io.error_from(e).with_ctx(&format!("reading {}", dir.join(name).display()))),
	}
}

/// The `bcdDevice` and `serial` attributes, which every directory that has them must agree on.
pub fn revision_and_serial(aux_paths: &[PathBuf]) -> Result<(Option<DeviceRevision>, Option<String>)>
{
	let mut revision: Option<String> = None;
	let mut serial: Option<String> = None;

	for dir in aux_paths {
		for (name, slot) in [("bcdDevice", &mut revision), ("serial", &mut serial)] {
			let Some(value) = read_attribute(dir, name)? else {
				continue;
			};
			if let Some(previous) = slot.as_deref() {
				if previous != value {
					return Err(ErrorKind::Enumeration(format!(
						"{} disagrees between sysfs entries: '{}' vs '{}'",
						name, previous, value
					))
					.error());
				}
			}
			*slot = Some(value);
		}
	}

	let revision = revision
		.map(|text| {
			text.parse::<DeviceRevision>()
				.map_err(|e| ErrorKind::Enumeration(format!("bad bcdDevice '{}'", text)).error_from(e))
		})
		.transpose()?;
	Ok((revision, serial))
}

/// Interfaces (never the device itself) that currently have a kernel driver bound.
fn bound_interfaces(aux_paths: &[PathBuf]) -> impl Iterator<Item = &PathBuf>
{
	aux_paths.iter().skip(1).filter(|dir| dir.join("driver").exists())
}

pub fn drivers(aux_paths: &[PathBuf]) -> Result<Vec<String>>
{
	let mut names = Vec::new();
	for dir in bound_interfaces(aux_paths) {
		let link = fs::read_link(dir.join("driver"))
			.map_err(|e| ErrorKind::Io.error_from(e).with_ctx(&format!("reading {}/driver", dir.display())))?;
		if let Some(name) = link.file_name().and_then(|name| name.to_str()) {
			names.push(name.to_string());
		}
	}
	names.sort();
	names.dedup();
	Ok(names)
}

pub fn tty_nodes(aux_paths: &[PathBuf]) -> Result<Vec<PathBuf>>
{
	let mut ttys = Vec::new();
	for dir in aux_paths {
		let tty_dir = dir.join("tty");
		if !tty_dir.is_dir() {
			continue;
		}
		let mut names: Vec<_> = fs::read_dir(&tty_dir)?
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.file_name())
			.collect();
		names.sort();
		if names.len() != 1 {
			warn!("Expected one tty under {}, found {}", tty_dir.display(), names.len());
		}
		ttys.extend(names.into_iter().map(|name| Path::new("/dev").join(name)));
	}
	Ok(ttys)
}

/// Unbind every driver from the device's interfaces, running `helper` through `runner` when the
/// kernel refuses us.
pub fn detach(device: &Device, helper: Option<&UnbindHelper>, runner: &dyn ToolRunner) -> Result<()>
{
	for dir in bound_interfaces(&device.aux_paths) {
		let unbind = dir.join("driver").join("unbind");
		let interface = dir
			.file_name()
			.and_then(|name| name.to_str())
			.ok_or_else(|| ErrorKind::Enumeration(format!("odd sysfs path {}", dir.display())).error())?;

		debug!("Unbinding {} via {}", interface, unbind.display());
		match fs::write(&unbind, interface) {
			Ok(()) => (),
			Err(e) if e.kind() == io::ErrorKind::PermissionDenied => match helper {
				Some(helper) => helper.unbind(runner, &unbind, interface)?,
				None => {
					return Err(ErrorKind::Permission {
						interface: interface.into(),
					}
					.error_from(e));
				},
			},
			Err(e) => return Err(ErrorKind::Io.error_from(e).with_ctx(&format!("writing {}", unbind.display()))),
		}
	}
	Ok(())
}

/// The setuid `unbind-helper` program, for detaching drivers without running as root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindHelper
{
	program: PathBuf,
}

impl UnbindHelper
{
	/// Exit status the helper gives when run without arguments.
	pub const NO_ARGUMENTS_STATUS: i32 = 255;

	pub fn new<P: Into<PathBuf>>(program: P) -> Self
	{
		Self {
			program: program.into(),
		}
	}

	pub fn program(&self) -> &Path
	{
		&self.program
	}

	/// Look for the helper next to our own executable, then in `PATH`.
	pub fn discover() -> Option<Self>
	{
		let mut candidates = Vec::new();
		if let Some(dir) = env::current_exe().ok().as_deref().and_then(Path::parent) {
			candidates.push(dir.join("unbind-helper"));
		}
		candidates.push(PathBuf::from("unbind-helper"));
		Self::discover_in(&SystemRunner, candidates)
	}

	pub fn discover_in<I>(runner: &dyn ToolRunner, candidates: I) -> Option<Self>
	where
		I: IntoIterator<Item = PathBuf>,
	{
		for candidate in candidates {
			let command = ToolCommand::new(&candidate.display().to_string());
			match runner.run(&command) {
				Ok(output) if output.exit_code == Some(Self::NO_ARGUMENTS_STATUS) => {
					debug!("Using unbind helper {}", candidate.display());
					return Some(Self::new(candidate));
				},
				_ => trace!("{} is not a usable unbind helper", candidate.display()),
			}
		}
		warn!("unbind-helper not found, detaching drivers will need root");
		None
	}

	pub fn unbind(&self, runner: &dyn ToolRunner, unbind_path: &Path, interface: &str) -> Result<()>
	{
		let command = ToolCommand::new(&self.program.display().to_string())
			.path_arg(unbind_path)
			.arg(interface);
		let output = runner.run(&command)?;
		if output.success() {
			Ok(())
		} else {
			Err(ErrorKind::Permission {
				interface: interface.into(),
			}
			.error()
			.with_ctx(&format!("running {}: {}", command, output.output.trim())))
		}
	}
}
