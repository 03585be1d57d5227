// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

//! Module for error handling code.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::board::{BoardState, BoardType};
use crate::tool::ToolFailure;

/// Kinds of errors for [Error]. Use [ErrorKind::error] and [ErrorKind::error_from] to generate the
/// [Error] value for this ErrorKind.
#[derive(Debug, Error)]
pub enum ErrorKind
{
	/// Listing the attached USB devices failed, or the listing made no sense.
	#[error("USB enumeration failed: {0}")]
	Enumeration(String),

	/// Writing to a sysfs `unbind` file was refused and no privileged helper could do it for us.
	#[error("Permission denied detaching driver from interface {interface} (is the unbind helper installed?)")]
	Permission
	{
		interface: String,
	},

	#[error("Cannot switch a {board_type} board into {target} mode: {reason}")]
	UnsupportedTransition
	{
		board_type: BoardType,
		target: BoardState,
		reason: &'static str,
	},

	/// The board re-enumerated, but into neither the state it left nor the one we asked for.
	#[error("{board_type} board came back in {observed} mode, expected {expected} (it was {previous})")]
	UnexpectedState
	{
		board_type: BoardType,
		previous: BoardState,
		expected: BoardState,
		observed: BoardState,
	},

	#[error("Timed out after {waited:?} waiting for the {board_type} board to reach {target} mode")]
	Timeout
	{
		board_type: BoardType,
		target: BoardState,
		waited: Duration,
	},

	#[error("Firmware file {} is malformed: {reason}", path.display())]
	MalformedFirmware
	{
		path: PathBuf,
		reason: String,
	},

	/// An external tool failed in a way that usually goes away when run again.
	#[error("{0}")]
	RetryableTool(ToolFailure),

	#[error("{0}")]
	FatalTool(ToolFailure),

	/// An external tool could not be started at all.
	#[error("Could not run {program}, is it installed and in PATH?")]
	ToolUnavailable
	{
		program: String,
	},

	#[error("Unknown device revision {revision} for {vid:04x}:{pid:04x}")]
	UnknownDeviceRevision
	{
		vid: u16,
		pid: u16,
		revision: String,
	},

	#[error("Found {uarts} USB-UART adapter(s) but {boards} Atlys board(s), cannot tell which belongs to which")]
	UartAssociation
	{
		uarts: usize,
		boards: usize,
	},

	#[error("Firmware file {name} not found (searched {})", display_paths(searched))]
	FirmwareNotFound
	{
		name: String,
		searched: Vec<PathBuf>,
	},

	#[error("{board_type} board is not ready: {reason}")]
	BoardNotReady
	{
		board_type: BoardType,
		reason: String,
	},

	/// Operation is recognised but there is no implementation for it.
	#[error("{0} is not supported by this tool")]
	CapabilityUnavailable(&'static str),

	#[error("No matching HDMI2USB board was found! Check connection?")]
	DeviceNotFound,

	#[error("Operation only accepts one board, but several were found")]
	TooManyDevices,

	#[error("I/O error")]
	Io,
}

impl ErrorKind
{
	/// Creates a new [Error] from this error kind.
	///
	/// Enables convenient code like:
	/// ```
	/// # use hdmi2usb_modeswitch::error::{Error, ErrorKind};
	/// # fn do_something() -> Result<(), Error> {
	/// return Err(ErrorKind::DeviceNotFound.error());
	/// # }
	/// ```
	#[inline(always)]
	pub fn error(self) -> Error
	{
		Error::new(self, None)
	}

	/// Creates a new [Error] from this error kind, with the passed error as the source.
	#[inline(always)]
	pub fn error_from<E>(self, source: E) -> Error
	where
		E: StdError + Send + Sync + 'static,
	{
		Error::new(self, Some(Box::new(source)))
	}
}

fn display_paths(paths: &[PathBuf]) -> String
{
	paths
		.iter()
		.map(|path| path.display().to_string())
		.collect::<Vec<_>>()
		.join(", ")
}

/// Error type for the library. Wraps an [ErrorKind] with an optional source error and an optional
/// description of what was being done when it happened.
#[derive(Debug)]
pub struct Error
{
	kind: ErrorKind,
	source: Option<Box<dyn StdError + Send + Sync>>,
	context: Option<String>,
}

impl Error
{
	pub fn new(kind: ErrorKind, source: Option<Box<dyn StdError + Send + Sync>>) -> Self
	{
		Self {
			kind,
			source,
			context: None,
		}
	}

	/// Attach what we were doing ("flashing gateware", "reading sysfs") to this error.
	#[must_use]
	pub fn with_ctx(mut self, ctx: &str) -> Self
	{
		self.context = Some(ctx.into());
		self
	}

	pub fn kind(&self) -> &ErrorKind
	{
		&self.kind
	}

	pub fn context(&self) -> Option<&str>
	{
		self.context.as_deref()
	}

	/// True when running the same operation again has a fair chance of succeeding.
	pub fn is_retryable(&self) -> bool
	{
		matches!(self.kind, ErrorKind::RetryableTool(_))
	}
}

impl Display for Error
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
	{
		match &self.context {
			Some(ctx) => write!(f, "(while {}): {}", ctx, self.kind)?,
			None => write!(f, "{}", self.kind)?,
		}

		if let Some(source) = &self.source {
			write!(f, "\nCaused by: {}", source)?;
		}

		Ok(())
	}
}

impl StdError for Error
{
	fn source(&self) -> Option<&(dyn StdError + 'static)>
	{
		self.source.as_deref().map(|source| source as &(dyn StdError + 'static))
	}
}

impl From<ErrorKind> for Error
{
	fn from(kind: ErrorKind) -> Self
	{
		kind.error()
	}
}

impl From<std::io::Error> for Error
{
	fn from(other: std::io::Error) -> Self
	{
		ErrorKind::Io.error_from(other)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn context_is_prefixed()
	{
		let err = ErrorKind::DeviceNotFound.error().with_ctx("looking for boards");
		let text = err.to_string();
		assert!(text.starts_with("(while looking for boards): No matching HDMI2USB board"));
		assert_eq!(err.context(), Some("looking for boards"));
	}

	#[test]
	fn io_errors_keep_their_source()
	{
		let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
		let err: Error = io.into();
		assert!(matches!(err.kind(), ErrorKind::Io));
		assert!(err.source().is_some());
		assert!(err.to_string().contains("Caused by: gone"));
	}

	#[test]
	fn only_retryable_tool_failures_are_retryable()
	{
		let failure = ToolFailure {
			summary: "openocd failed".into(),
			command_line: "openocd".into(),
			exit_code: Some(1),
			retry_matches: Vec::new(),
			fatal_matches: Vec::new(),
			output: String::new(),
		};
		assert!(ErrorKind::RetryableTool(failure.clone()).error().is_retryable());
		assert!(!ErrorKind::FatalTool(failure).error().is_retryable());
		assert!(!ErrorKind::Io.error().is_retryable());
	}
}
