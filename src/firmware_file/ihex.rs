// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

use std::path::Path;

use super::{FirmwareImage, malformed};
use crate::error::Result;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;

/// An FX2 firmware image in Intel HEX format, as consumed by `fxload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntelHexImage
{
	pub records: usize,
	/// Total bytes carried by data records.
	pub data_bytes: usize,
}

impl FirmwareImage for IntelHexImage
{
	const EXTENSIONS: &'static [&'static str] = &["hex", "ihx", "ihex"];

	fn parse(path: &Path, data: &[u8]) -> Result<Self>
	{
		let text = std::str::from_utf8(data).map_err(|_| malformed(path, "Intel HEX file is not text"))?;
		let mut image = Self {
			records: 0,
			data_bytes: 0,
		};

		for (index, line) in text.lines().map(str::trim).enumerate().filter(|(_, line)| !line.is_empty()) {
			let line_no = index + 1;
			let bytes = decode_record(line).map_err(|reason| malformed(path, format!("line {}: {}", line_no, reason)))?;
			image.records += 1;
			match bytes[3] {
				RECORD_EOF => return Ok(image),
				RECORD_DATA => image.data_bytes += bytes[0] as usize,
				_ => (),
			}
		}

		Err(malformed(path, "no end-of-file record"))
	}
}

/// Decode and check one `:LLAAAATT...CC` record, returning all of its bytes.
fn decode_record(line: &str) -> std::result::Result<Vec<u8>, String>
{
	let body = line.strip_prefix(':').ok_or("record does not start with ':'")?;
	if !body.is_ascii() || body.len() % 2 != 0 || body.len() < 10 {
		return Err("record is too short or has an odd number of digits".into());
	}
	let bytes = (0..body.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&body[i..i + 2], 16))
		.collect::<std::result::Result<Vec<u8>, _>>()
		.map_err(|_| "record contains non-hex characters".to_string())?;

	// length, 2 address bytes, type, data, checksum
	if bytes.len() != bytes[0] as usize + 5 {
		return Err(format!("record length byte says {} but the record holds {}", bytes[0], bytes.len() - 5));
	}
	let sum = bytes.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
	if sum != 0 {
		return Err("bad checksum".into());
	}
	Ok(bytes)
}

#[cfg(test)]
mod tests
{
	use super::*;

	const VALID: &str = "\
:0300000002003EBD
:03000B000204628A
:00000001FF
";

	#[test]
	fn accepts_fx2_images() -> Result<()>
	{
		let image = IntelHexImage::parse(Path::new("ixo-usb-jtag.hex"), VALID.as_bytes())?;
		assert_eq!(image.records, 3);
		assert_eq!(image.data_bytes, 6);
		Ok(())
	}

	#[test]
	fn checks_every_record()
	{
		let path = Path::new("fw.ihx");
		let bad_checksum = VALID.replace(":0300000002003EBD", ":0300000002003EBC");
		let bad_start = VALID.replace(":03000B", "03000B");
		let bad_length = VALID.replace(":0300000002003EBD", ":0400000002003EB8");
		let no_eof = VALID.replace(":00000001FF\n", "");

		for text in [bad_checksum, bad_start, bad_length, no_eof] {
			assert!(IntelHexImage::parse(path, text.as_bytes()).is_err(), "{:?} should fail", text);
		}
		assert!(IntelHexImage::parse(path, &[0xff, 0xfe]).is_err());
	}
}
