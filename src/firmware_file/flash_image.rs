// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use super::{FirmwareImage, malformed};
use crate::error::Result;

/// Dummy words, then the Spartan-6 sync word and the first configuration packet header.
pub const SYNC_HEADER: [u8; 24] = [
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xaa, 0x99, 0x55,
	0x66, 0x30, 0xa1, 0x00, 0x07,
];

/// A raw Xilinx `.bin` configuration image, ready to be written to SPI flash as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XilinxBinFile
{
	pub length: usize,
}

impl FirmwareImage for XilinxBinFile
{
	const EXTENSIONS: &'static [&'static str] = &["bin"];

	fn parse(path: &Path, data: &[u8]) -> Result<Self>
	{
		if data.starts_with(&SYNC_HEADER) {
			Ok(Self {
				length: data.len(),
			})
		} else {
			Err(malformed(path, "file doesn't start with the Xilinx sync header"))
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn needs_the_sync_header() -> Result<()>
	{
		let mut image = SYNC_HEADER.to_vec();
		image.extend_from_slice(&[0x20, 0x00, 0x00, 0x00]);
		assert_eq!(XilinxBinFile::parse(Path::new("a.bin"), &image)?.length, 28);

		image[17] = 0x98;
		assert!(XilinxBinFile::parse(Path::new("a.bin"), &image).is_err());
		assert!(XilinxBinFile::parse(Path::new("a.bin"), &SYNC_HEADER[..10]).is_err());
		Ok(())
	}
}
