// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Running the external programs (`fxload`, `openocd`, `dfu-util`, `lsusb`) that do the actual
//! talking to hardware, and describing how they failed.

use std::env;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, trace};

use crate::error::{ErrorKind, Result};

/// A command line for an external tool, plus any directories that should be added to the end
/// of `PATH` when looking the program up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand
{
	program: String,
	args: Vec<String>,
	extra_path: Vec<PathBuf>,
}

impl ToolCommand
{
	pub fn new(program: &str) -> Self
	{
		Self {
			program: program.into(),
			args: Vec::new(),
			extra_path: Vec::new(),
		}
	}

	#[must_use]
	pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self
	{
		self.args.push(arg.as_ref().into());
		self
	}

	#[must_use]
	pub fn path_arg<P: AsRef<Path>>(mut self, path: P) -> Self
	{
		self.args.push(path.as_ref().display().to_string());
		self
	}

	#[must_use]
	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
		self
	}

	/// Append a directory to the `PATH` the tool is looked up in.
	#[must_use]
	pub fn search_path<P: Into<PathBuf>>(mut self, dir: P) -> Self
	{
		self.extra_path.push(dir.into());
		self
	}

	pub fn program(&self) -> &str
	{
		&self.program
	}

	pub fn arguments(&self) -> &[String]
	{
		&self.args
	}

	/// The command rendered the way a user would type it into a shell.
	pub fn command_line(&self) -> String
	{
		let mut line = self.program.clone();
		for arg in &self.args {
			line.push(' ');
			if arg.is_empty() || arg.contains(char::is_whitespace) {
				line.push('"');
				line.push_str(arg);
				line.push('"');
			} else {
				line.push_str(arg);
			}
		}
		line
	}

	fn augmented_path(&self) -> Option<OsString>
	{
		if self.extra_path.is_empty() {
			return None;
		}
		let current = env::var_os("PATH").unwrap_or_default();
		let dirs = env::split_paths(&current).chain(self.extra_path.iter().cloned());
		env::join_paths(dirs).ok()
	}
}

impl Display for ToolCommand
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		f.write_str(&self.command_line())
	}
}

/// What a tool left behind: its exit code (`None` if it was killed by a signal) and everything it
/// printed. The two streams are captured separately and joined as all of stdout then all of
/// stderr, so lines are not in the order the tool wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput
{
	pub exit_code: Option<i32>,
	pub output: String,
}

impl ToolOutput
{
	pub fn success(&self) -> bool
	{
		self.exit_code == Some(0)
	}
}

/// Runs tool commands to completion. Implemented for real by [SystemRunner]; tests swap in a
/// recording fake.
pub trait ToolRunner
{
	fn run(&self, command: &ToolCommand) -> Result<ToolOutput>;
}

/// [ToolRunner] that spawns real child processes and waits for them. See [ToolOutput] for how the
/// output streams are combined.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner
{
	fn run(&self, command: &ToolCommand) -> Result<ToolOutput>
	{
		debug!("Running {}", command);
		let mut child = Command::new(&command.program);
		child.args(&command.args);
		if let Some(path) = command.augmented_path() {
			child.env("PATH", path);
		}

		let output = child.output().map_err(|e| match e.kind() {
			io::ErrorKind::NotFound => ErrorKind::ToolUnavailable {
				program: command.program.clone(),
			}
			.error_from(e),
			_ => ErrorKind::Io.error_from(e).with_ctx(&format!("running {}", command.program)),
		})?;

		let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
		text.push_str(&String::from_utf8_lossy(&output.stderr));
		trace!("{} exited with {:?}, output:\n{}", command.program, output.status.code(), text);

		Ok(ToolOutput {
			exit_code: output.status.code(),
			output: text,
		})
	}
}

/// Everything known about a failed tool run, carried inside
/// [ErrorKind::RetryableTool]/[ErrorKind::FatalTool].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure
{
	pub summary: String,
	pub command_line: String,
	pub exit_code: Option<i32>,
	pub retry_matches: Vec<String>,
	pub fatal_matches: Vec<String>,
	pub output: String,
}

impl ToolFailure
{
	pub fn new(summary: &str, command: &ToolCommand, output: &ToolOutput) -> Self
	{
		Self {
			summary: summary.into(),
			command_line: command.command_line(),
			exit_code: output.exit_code,
			retry_matches: Vec::new(),
			fatal_matches: Vec::new(),
			output: output.output.clone(),
		}
	}

	#[must_use]
	pub fn with_matches(mut self, retry_matches: Vec<String>, fatal_matches: Vec<String>) -> Self
	{
		self.retry_matches = retry_matches;
		self.fatal_matches = fatal_matches;
		self
	}
}

impl Display for ToolFailure
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		writeln!(f, "{}", self.summary)?;
		writeln!(f, "Command: {}", self.command_line)?;
		match self.exit_code {
			Some(code) => writeln!(f, "Exit code: {}", code)?,
			None => writeln!(f, "Exit code: none (killed by signal)")?,
		}
		for line in &self.fatal_matches {
			writeln!(f, "Fatal error: {}", line)?;
		}
		for line in &self.retry_matches {
			writeln!(f, "Transient error: {}", line)?;
		}
		writeln!(f, "---------------- output ----------------")?;
		f.write_str(self.output.trim_end())?;
		write!(f, "\n----------------------------------------")
	}
}
