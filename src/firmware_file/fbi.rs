// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use super::{FirmwareImage, be_u32, crc32, malformed};
use crate::error::Result;

/// Soft-CPU firmware boot image: big endian length and CRC-32, then exactly `length` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashBootImage
{
	pub length: u32,
	pub crc: u32,
}

impl FlashBootImage
{
	pub const HEADER_LEN: usize = 8;
}

impl FirmwareImage for FlashBootImage
{
	const EXTENSIONS: &'static [&'static str] = &["fbi"];

	fn parse(path: &Path, data: &[u8]) -> Result<Self>
	{
		if data.len() < Self::HEADER_LEN {
			return Err(malformed(path, "too short for a boot image header"));
		}
		let length = be_u32(&data[0..4]);
		let crc = be_u32(&data[4..8]);
		let payload = &data[Self::HEADER_LEN..];

		if payload.len() != length as usize {
			return Err(malformed(
				path,
				format!("header says {} bytes of payload but the file has {}", length, payload.len()),
			));
		}
		let actual = crc32(payload);
		if actual != crc {
			return Err(malformed(path, format!("CRC mismatch: header 0x{:08x}, payload 0x{:08x}", crc, actual)));
		}

		Ok(Self {
			length,
			crc,
		})
	}
}
