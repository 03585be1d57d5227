// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use super::{FirmwareImage, malformed};
use crate::error::Result;

/// Length of the DFU 1.1 file suffix.
const SUFFIX_LEN: usize = 16;

/// An image carrying the DFU file suffix, as `dfu-util -D` expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfuImage
{
	pub vid: u16,
	pub pid: u16,
	pub payload_len: usize,
}

impl FirmwareImage for DfuImage
{
	const EXTENSIONS: &'static [&'static str] = &["dfu"];

	fn parse(path: &Path, data: &[u8]) -> Result<Self>
	{
		if data.len() < SUFFIX_LEN {
			return Err(malformed(path, "too short to carry a DFU suffix"));
		}
		let suffix = &data[data.len() - SUFFIX_LEN..];
		// bcdDevice, idProduct, idVendor, bcdDFU, "UFD", bLength, dwCRC (all little endian)
		if &suffix[8..11] != b"UFD" || suffix[11] as usize != SUFFIX_LEN {
			return Err(malformed(path, "missing DFU suffix"));
		}

		let stored = u32::from_le_bytes([suffix[12], suffix[13], suffix[14], suffix[15]]);
		// The suffix CRC is the raw register value, without the final inversion.
		let actual = !crc32fast::hash(&data[..data.len() - 4]);
		if stored != actual {
			return Err(malformed(path, format!("DFU suffix CRC 0x{:08x} does not match 0x{:08x}", stored, actual)));
		}

		Ok(Self {
			pid: u16::from_le_bytes([suffix[2], suffix[3]]),
			vid: u16::from_le_bytes([suffix[4], suffix[5]]),
			payload_len: data.len() - SUFFIX_LEN,
		})
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn with_suffix(payload: &[u8]) -> Vec<u8>
	{
		let mut image = payload.to_vec();
		image.extend_from_slice(&[0xff, 0xff, 0x41, 0x54, 0x19, 0x2a, 0x00, 0x01, b'U', b'F', b'D', 16]);
		let crc = !crc32fast::hash(&image);
		image.extend_from_slice(&crc.to_le_bytes());
		image
	}

	#[test]
	fn reads_the_suffix() -> Result<()>
	{
		let image = DfuImage::parse(Path::new("hdmi2usb.dfu"), &with_suffix(b"firmware"))?;
		assert_eq!(image, DfuImage {
			vid: 0x2a19,
			pid: 0x5441,
			payload_len: 8,
		});
		Ok(())
	}

	#[test]
	fn rejects_damaged_files()
	{
		let mut image = with_suffix(b"firmware");
		image[0] ^= 0x80;
		assert!(DfuImage::parse(Path::new("a.dfu"), &image).is_err());
		assert!(DfuImage::parse(Path::new("a.dfu"), b"firmware without any suffix").is_err());
	}
}
