// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use super::{FirmwareImage, be_u32, crc32, malformed};
use crate::error::Result;

/// Soft-CPU BIOS image: the payload followed by its big endian CRC-32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosImage
{
	pub crc: u32,
}

impl FirmwareImage for BiosImage
{
	const EXTENSIONS: &'static [&'static str] = &["bin"];

	fn parse(path: &Path, data: &[u8]) -> Result<Self>
	{
		if data.len() <= 4 {
			return Err(malformed(path, "too short for a BIOS image"));
		}
		let (payload, trailer) = data.split_at(data.len() - 4);
		let crc = be_u32(trailer);
		let actual = crc32(payload);
		if crc == actual {
			Ok(Self {
				crc,
			})
		} else {
			Err(malformed(path, format!("CRC mismatch: trailer 0x{:08x}, payload 0x{:08x}", crc, actual)))
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn trailer_must_match()
	{
		let mut image = b"lm32 bios code".to_vec();
		let crc = crc32fast::hash(&image);
		image.extend_from_slice(&crc.to_be_bytes());

		assert_eq!(BiosImage::parse(Path::new("bios.bin"), &image).ok(), Some(BiosImage {
			crc
		}));

		image[0] = b'L';
		assert!(BiosImage::parse(Path::new("bios.bin"), &image).is_err());
		assert!(BiosImage::parse(Path::new("bios.bin"), &[1, 2, 3, 4]).is_err());
	}
}
