// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Unbinds one interface from one of a short list of kernel drivers. Meant to be installed setuid
//! root so the mode-switch tool can detach drivers without the whole tool running as root.
//!
//! Usage: `unbind-helper <path to driver unbind file> <interface>`. Exits with 255 on any failure,
//! including being run without arguments, which is how the tool checks the helper is present.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Drivers we are willing to unbind things from.
const ALLOWED_DRIVERS: &[&str] = &[
	"/sys/bus/usb/drivers/uvcvideo",
	"/sys/bus/usb/drivers/cdc_acm",
	"/sys/bus/usb/drivers/usbtest",
];

const FAILURE: u8 = 255;

/// Check an already canonicalised path is the unbind file of an allowed driver.
fn check_unbind_path(path: &Path) -> Result<(), String>
{
	if !ALLOWED_DRIVERS.iter().any(|driver| path.starts_with(driver)) {
		return Err(format!("{} should be under one of {}", path.display(), ALLOWED_DRIVERS.join(", ")));
	}
	if path.file_name().is_none_or(|name| name != "unbind") {
		return Err(format!("{} should end in /unbind", path.display()));
	}
	Ok(())
}

fn unbind(unbind_path: &str, interface: &str) -> Result<(), String>
{
	let path: PathBuf = Path::new(unbind_path)
		.canonicalize()
		.map_err(|e| format!("Could not resolve {}: {}", unbind_path, e))?;
	check_unbind_path(&path)?;

	let mut file = OpenOptions::new()
		.write(true)
		.open(&path)
		.map_err(|e| format!("Could not open {}: {}", path.display(), e))?;
	file.write_all(interface.as_bytes())
		.map_err(|e| format!("Could not write {} to {}: {}", interface, path.display(), e))
}

fn main() -> ExitCode
{
	let args: Vec<String> = env::args().skip(1).collect();
	let [unbind_path, interface] = args.as_slice() else {
		println!("Must give 2 arguments not {}", args.len());
		return ExitCode::from(FAILURE);
	};

	match unbind(unbind_path, interface) {
		Ok(()) => ExitCode::SUCCESS,
		Err(message) => {
			println!("{}", message);
			ExitCode::from(FAILURE)
		},
	}
}
