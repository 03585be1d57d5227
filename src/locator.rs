// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{debug, trace};

use crate::error::{ErrorKind, Result};

/// Environment variable naming the firmware package directory.
pub const FIRMWARE_DIR_ENV: &str = "HDMI2USB_FIRMWARE_DIR";

/// Finds firmware files by name, trying the name as given and then each search directory in turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirmwareLocator
{
	search_dirs: Vec<PathBuf>,
}

impl FirmwareLocator
{
	pub fn new(search_dirs: Vec<PathBuf>) -> Self
	{
		Self {
			search_dirs,
		}
	}

	/// The current directory, then the firmware package directory: `$HDMI2USB_FIRMWARE_DIR` if set,
	/// else `firmware/` next to our `bin/`, else the platform data directory.
	pub fn from_environment() -> Self
	{
		let mut search_dirs = Vec::new();
		if let Ok(cwd) = env::current_dir() {
			search_dirs.push(cwd);
		}
		if let Some(package_dir) = package_firmware_dir() {
			search_dirs.push(package_dir);
		}
		debug!("Firmware search path: {:?}", search_dirs);
		Self::new(search_dirs)
	}

	/// Put `dir` in front of everything else.
	#[must_use]
	pub fn with_override(mut self, dir: PathBuf) -> Self
	{
		self.search_dirs.insert(0, dir);
		self
	}

	pub fn search_dirs(&self) -> &[PathBuf]
	{
		&self.search_dirs
	}

	/// Resolve `name` to an existing file.
	pub fn locate<P: AsRef<Path>>(&self, name: P) -> Result<PathBuf>
	{
		let name = name.as_ref();
		let candidates = std::iter::once(name.to_path_buf()).chain(self.search_dirs.iter().map(|dir| dir.join(name)));
		for candidate in candidates {
			trace!("Looking for firmware at {}", candidate.display());
			if candidate.is_file() {
				return Ok(candidate.canonicalize().unwrap_or(candidate));
			}
		}

		Err(ErrorKind::FirmwareNotFound {
			name: name.display().to_string(),
			searched: self.search_dirs.clone(),
		}
		.error())
	}
}

fn package_firmware_dir() -> Option<PathBuf>
{
	if let Some(dir) = env::var_os(FIRMWARE_DIR_ENV) {
		return Some(PathBuf::from(dir));
	}

	let beside_exe = env::current_exe()
		.ok()
		.and_then(|exe| Some(exe.parent()?.parent()?.join("firmware")))
		.filter(|dir| dir.is_dir());
	if beside_exe.is_some() {
		return beside_exe;
	}

	ProjectDirs::from("org", "hdmi2usb", "hdmi2usb-mode-switch").map(|dirs| dirs.data_dir().join("firmware"))
}
