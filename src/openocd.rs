// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Driving OpenOCD, and deciding from its output whether a run worked, is worth retrying, or
//! failed for good.
//!
//! OpenOCD's exit status alone is not enough: a flaky JTAG chain often produces an "exit 0" run
//! that did nothing useful, which we can only spot from what it printed.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::Regex;

use crate::board::BoardType;
use crate::error::{ErrorKind, Result};
use crate::tool::{ToolCommand, ToolFailure, ToolOutput, ToolRunner};

/// Output that means the JTAG chain misbehaved and the same command may well work next time.
pub const RETRY_SIGNATURES: &[&str] = &[
	// The DNA read back as a repeating pattern, so the chain isn't really there.
	r"DNA = [01]+ \(0x18181818.*\)",
	r"Info : TAP xc6s.tap does not have IDCODE",
	r"Warn : Bypassing JTAG setup events due to errors",
	r"Error: Trying to use configured scan chain anyway\.\.\.",
];

/// Output that means running again won't help. None known yet.
pub const FATAL_SIGNATURES: &[&str] = &[];

static DEFAULT_CLASSIFIER: LazyLock<OutputClassifier> = LazyLock::new(|| {
	OutputClassifier::with_signatures(RETRY_SIGNATURES, FATAL_SIGNATURES).expect("built-in signatures are valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict
{
	Success,
	Retry
	{
		matches: Vec<String>,
	},
	Fatal
	{
		fatal: Vec<String>,
		retry: Vec<String>,
	},
}

#[derive(Debug, Clone)]
pub struct OutputClassifier
{
	retry: Vec<Regex>,
	fatal: Vec<Regex>,
}

impl OutputClassifier
{
	pub fn with_signatures(retry: &[&str], fatal: &[&str]) -> std::result::Result<Self, regex::Error>
	{
		let compile = |patterns: &[&str]| -> std::result::Result<Vec<Regex>, regex::Error> {
			patterns.iter().map(|pattern| Regex::new(pattern)).collect()
		};
		Ok(Self {
			retry: compile(retry)?,
			fatal: compile(fatal)?,
		})
	}

	/// Fatal signatures win over retry signatures, which win over the exit code.
	pub fn classify(&self, exit_code: Option<i32>, output: &str) -> Verdict
	{
		let found = |patterns: &[Regex]| -> Vec<String> {
			let mut matches: Vec<String> = patterns
				.iter()
				.filter_map(|pattern| pattern.find(output))
				.map(|found| found.as_str().to_string())
				.collect();
			matches.dedup();
			matches
		};
		let fatal = found(&self.fatal);
		let retry = found(&self.retry);

		if !fatal.is_empty() {
			Verdict::Fatal {
				fatal,
				retry,
			}
		} else if !retry.is_empty() || exit_code != Some(0) {
			Verdict::Retry {
				matches: retry,
			}
		} else {
			Verdict::Success
		}
	}
}

/// Classify a run with the built-in signatures.
pub fn classify_output(exit_code: Option<i32>, output: &str) -> Verdict
{
	DEFAULT_CLASSIFIER.classify(exit_code, output)
}

/// Turn a finished run into `Ok` or the right kind of tool error.
pub fn check_output(command: &ToolCommand, output: ToolOutput) -> Result<ToolOutput>
{
	match classify_output(output.exit_code, &output.output) {
		Verdict::Success => Ok(output),
		Verdict::Retry {
			matches,
		} => Err(ErrorKind::RetryableTool(
			ToolFailure::new("OpenOCD hit an error which means we should retry", command, &output)
				.with_matches(matches, Vec::new()),
		)
		.error()),
		Verdict::Fatal {
			fatal,
			retry,
		} => Err(ErrorKind::FatalTool(
			ToolFailure::new("OpenOCD hit a fatal error", command, &output).with_matches(retry, fatal),
		)
		.error()),
	}
}

/// A sequence of OpenOCD commands, run in one `-c` argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenOcdScript
{
	commands: Vec<String>,
}

impl OpenOcdScript
{
	/// `init` followed by a DNA read, which every one of our scripts starts with so a dead JTAG chain
	/// shows up in the output.
	pub fn new() -> Self
	{
		Self::default().command("init").command("xc6s_print_dna xc6s.tap")
	}

	#[must_use]
	pub fn command<S: Into<String>>(mut self, command: S) -> Self
	{
		self.commands.push(command.into());
		self
	}

	#[must_use]
	pub fn pld_load(self, bitstream: &Path) -> Self
	{
		self.command(format!("pld load 0 {}", bitstream.display()))
	}

	#[must_use]
	pub fn jtagspi_init(self, proxy: &Path) -> Self
	{
		self.command(format!("jtagspi_init 0 {}", proxy.display()))
	}

	#[must_use]
	pub fn jtagspi_program(self, image: &Path, offset: u32) -> Self
	{
		self.command(format!("jtagspi_program {} 0x{:x}", image.display(), offset))
	}

	#[must_use]
	pub fn reset_halt(self) -> Self
	{
		self.command("reset halt")
	}

	#[must_use]
	pub fn exit(self) -> Self
	{
		self.command("exit")
	}

	pub fn commands(&self) -> &[String]
	{
		&self.commands
	}
}

impl Display for OpenOcdScript
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		f.write_str(&self.commands.join("; "))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOcdOptions
{
	/// Same scale as the `-v` count: above 1 turns on OpenOCD's own debug output.
	pub verbosity: u8,
}

impl OpenOcdOptions
{
	fn debug_level(&self) -> Option<u8>
	{
		(self.verbosity > 1).then(|| self.verbosity - 2)
	}
}

pub fn script_command(board_type: BoardType, script: &OpenOcdScript, options: OpenOcdOptions) -> ToolCommand
{
	let mut command = ToolCommand::new("openocd")
		.args(["-f", board_type.openocd_config()])
		.arg("-c")
		.arg(script.to_string());
	if let Some(level) = options.debug_level() {
		command = command.arg(format!("--debug={}", level));
	}
	command
}

/// Run a script against the board's JTAG chain and classify the result.
pub fn run_script(
	runner: &dyn ToolRunner, board_type: BoardType, script: &OpenOcdScript, options: OpenOcdOptions,
) -> Result<ToolOutput>
{
	if options.verbosity > 1 {
		debug!("Using OpenOCD script:\n{}", script.commands().join(";\n"));
	}
	let command = script_command(board_type, script, options);
	info!("Running {}", command);
	let output = runner.run(&command)?;
	check_output(&command, output)
}

/// Spartan-6 Device DNA: a 57-bit factory-programmed unique ID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Dna(pub u64);

impl Display for Dna
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		write!(f, "0x{:x}", self.0)
	}
}

static DNA_LINE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?m)^DNA = ([01]+) \((0x[0-9a-fA-F]+)\)").expect("DNA pattern is valid"));

/// Find the `DNA = <binary> (0x<hex>)` line OpenOCD prints and check both spellings agree.
pub fn parse_dna(output: &str) -> std::result::Result<Dna, String>
{
	let captures = DNA_LINE.captures(output).ok_or("OpenOCD did not report a DNA")?;
	let binary = u64::from_str_radix(&captures[1], 2).map_err(|e| format!("bad binary DNA: {}", e))?;
	let hex = u64::from_str_radix(captures[2].trim_start_matches("0x"), 16).map_err(|e| format!("bad hex DNA: {}", e))?;
	if binary != hex {
		warn!("DNA read as 0x{:x} and 0x{:x}", binary, hex);
		return Err(format!("binary and hex DNA disagree (0x{:x} vs 0x{:x})", binary, hex));
	}
	Ok(Dna(binary))
}
