// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Xilinx `.bit` bitstreams. The header is a fixed preamble followed by key/length/value
//! records; we read up to the build time (`d`) and leave the bitstream itself alone.
//!
//! ```text
//! 00 09                         preamble length
//! 0f f0 0f f0 0f f0 0f f0 00    preamble
//! 00 01
//! 'a' len:u16 "xform.ncd\0"     design name
//! 'b' len:u16 "6slx45csg324\0"  part
//! 'c' len:u16 "2001/08/10\0"    date
//! 'd' len:u16 "06:55:04\0"      time
//! 'e' len:u32 ...               bitstream
//! ```

use std::path::Path;

use super::{FirmwareImage, malformed};
use crate::error::Result;

const PREAMBLE: [u8; 13] = [0x00, 0x09, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x00, 0x00, 0x01];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XilinxBitFile
{
	pub design: String,
	pub part: String,
	pub date: String,
	pub time: String,
}

impl FirmwareImage for XilinxBitFile
{
	const EXTENSIONS: &'static [&'static str] = &["bit"];

	fn parse(path: &Path, data: &[u8]) -> Result<Self>
	{
		if data.len() < PREAMBLE.len() || data[..PREAMBLE.len()] != PREAMBLE {
			return Err(malformed(path, "missing Xilinx bitstream preamble"));
		}

		let mut design = None;
		let mut part = None;
		let mut date = None;
		let mut rest = &data[PREAMBLE.len()..];
		loop {
			let (key, value, remaining) = record(rest).ok_or_else(|| malformed(path, "truncated bitstream header"))?;
			rest = remaining;
			match key {
				b'a' => design = Some(value),
				b'b' => part = Some(value),
				b'c' => date = Some(value),
				b'd' => {
					let missing = |what: &str| malformed(path, format!("bitstream header has no {}", what));
					return Ok(Self {
						design: design.ok_or_else(|| missing("design name"))?,
						part: part.ok_or_else(|| missing("part"))?,
						date: date.ok_or_else(|| missing("build date"))?,
						time: value,
					});
				},
				other => return Err(malformed(path, format!("unexpected bitstream header key 0x{:02x}", other))),
			}
		}
	}
}

impl XilinxBitFile
{
	pub fn matches_part(&self, part: &str) -> bool
	{
		self.part == part
	}
}

/// Split one `key len value\0` record off the front of `data`.
fn record(data: &[u8]) -> Option<(u8, String, &[u8])>
{
	let (&key, rest) = data.split_first()?;
	let length = u16::from_be_bytes([*rest.first()?, *rest.get(1)?]) as usize;
	let rest = &rest[2..];
	if length == 0 || rest.len() < length || rest[length - 1] != 0 {
		return None;
	}
	let value = String::from_utf8_lossy(&rest[..length - 1]).into_owned();
	Some((key, value, &rest[length..]))
}
