// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Validation of the firmware artifacts we hand to the loaders. A file that fails validation is
//! never sent to hardware.

use std::fs;
use std::path::Path;

use crate::error::{Error, ErrorKind, Result};

mod bios;
mod bit;
mod dfu;
mod fbi;
mod flash_image;
mod ihex;

pub use self::bios::BiosImage;
pub use self::bit::XilinxBitFile;
pub use self::dfu::DfuImage;
pub use self::fbi::FlashBootImage;
pub use self::flash_image::{SYNC_HEADER, XilinxBinFile};
pub use self::ihex::IntelHexImage;

/// A firmware file format we know how to check.
pub trait FirmwareImage: Sized
{
	/// Accepted file name extensions, without the dot.
	const EXTENSIONS: &'static [&'static str];

	/// Validate file contents. `path` is only used in error messages.
	fn parse(path: &Path, data: &[u8]) -> Result<Self>;

	/// Check the extension, read the file and validate it.
	fn from_path(path: &Path) -> Result<Self>
	{
		check_extension(path, Self::EXTENSIONS)?;
		let data = fs::read(path)
			.map_err(|e| ErrorKind::Io.error_from(e).with_ctx(&format!("reading firmware {}", path.display())))?;
		Self::parse(path, &data)
	}
}

pub(crate) fn malformed<S: Into<String>>(path: &Path, reason: S) -> Error
{
	ErrorKind::MalformedFirmware {
		path: path.to_path_buf(),
		reason: reason.into(),
	}
	.error()
}

pub fn check_extension(path: &Path, extensions: &[&str]) -> Result<()>
{
	let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
	if extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(extension)) {
		Ok(())
	} else {
		let wanted: Vec<String> = extensions.iter().map(|ext| format!(".{}", ext)).collect();
		Err(malformed(path, format!("expected a {} file", wanted.join("/"))))
	}
}

/// CRC-32 (IEEE), as used by the BIOS and boot image trailers.
pub(crate) fn crc32(data: &[u8]) -> u32
{
	crc32fast::hash(data)
}

pub(crate) fn be_u32(bytes: &[u8]) -> u32
{
	let mut word = [0u8; 4];
	word.copy_from_slice(&bytes[..4]);
	u32::from_be_bytes(word)
}
