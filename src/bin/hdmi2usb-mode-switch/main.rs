// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 HDMI2USB mode-switch contributors

mod operations;

use std::env;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::builder::styling::Styles;
use clap::{ArgAction, ArgGroup, CommandFactory, Parser, crate_description, crate_version};
use clap_complete::{Shell, generate};
use color_eyre::config::HookBuilder;
use color_eyre::eyre::{EyreHandler, InstallError, Result, eyre};
use hdmi2usb_modeswitch::BoardParams;
use hdmi2usb_modeswitch::board::{BoardState, BoardType};
use hdmi2usb_modeswitch::usb::{BackendChoice, PortId};
use log::{LevelFilter, warn};
use owo_colors::OwoColorize;

use crate::operations::Operation;

/// Find HDMI2USB boards and move them between FX2 firmware modes.
///
/// The FX2 is software configurable, so one board shows up under many different USB IDs
/// depending on what firmware it is running.
#[derive(Parser)]
#[command(
	version,
	about = format!("{} v{}", crate_description!(), crate_version!()),
	styles(style()),
	disable_colored_help(false),
	group(ArgGroup::new("operation").multiple(false)),
)]
struct CliArguments
{
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
	/// Output more information, repeat for even more
	verbose: u8,

	#[arg(long = "by-type", value_enum)]
	/// Find boards of the given type
	by_type: Option<BoardType>,
	#[arg(long = "by-position")]
	/// Find the board at a given position in the USB tree, like 1-2.3 for bus 1, port 2 (a hub),
	/// port 3
	by_position: Option<PortId>,
	#[arg(long = "all", default_value_t = false)]
	/// Operate on every matching board instead of requiring exactly one
	all: bool,

	#[arg(long = "mode", value_enum)]
	/// Switch the board into the given mode
	mode: Option<BoardState>,
	#[arg(long = "timeout")]
	/// How long to wait in seconds for a mode switch before giving up
	timeout: Option<f64>,

	#[arg(long = "get-usbfs", default_value_t = false)]
	/// Print the /dev/bus/usb path of the board
	get_usbfs: bool,
	#[arg(long = "get-sysfs", default_value_t = false)]
	/// Print the /sys/bus/usb/devices paths of the board
	get_sysfs: bool,
	#[arg(long = "get-state", default_value_t = false)]
	/// Print the mode the board is in
	get_state: bool,
	#[arg(long = "get-serial-device", default_value_t = false)]
	/// Print the serial port of the board
	get_serial_device: bool,
	#[arg(long = "get-dna", default_value_t = false)]
	/// Print the Device DNA of the board's FPGA (needs JTAG mode)
	get_dna: bool,
	#[arg(long = "prefer-hardware-serial", default_value_t = false)]
	/// Prefer the hardware USB-UART over the FX2 serial port on the Atlys
	prefer_hardware_serial: bool,

	#[arg(long = "load-gateware", group = "operation")]
	/// Load gateware onto the FPGA
	load_gateware: Option<PathBuf>,
	#[arg(long = "flash-gateware", group = "operation")]
	/// Flash gateware onto the SPI flash the FPGA boots from
	flash_gateware: Option<PathBuf>,
	#[arg(long = "reset-gateware", group = "operation", default_value_t = false)]
	/// Reset the gateware currently running on the FPGA
	reset_gateware: bool,
	#[arg(long = "flash-image", group = "operation")]
	/// Flash a combined gateware, BIOS and firmware image onto the SPI flash
	flash_image: Option<PathBuf>,
	#[arg(long = "load-fx2-firmware", group = "operation")]
	/// Load a firmware file onto the Cypress FX2
	load_fx2_firmware: Option<PathBuf>,
	#[arg(long = "flash-fx2-eeprom", group = "operation")]
	/// Flash the FX2 EEPROM through a DFU capable FX2 firmware (needs dfu-util)
	flash_fx2_eeprom: Option<PathBuf>,
	#[arg(long = "flash-softcpu-bios", alias = "flash-lm32-bios", group = "operation")]
	/// Flash the soft-CPU BIOS onto the SPI flash
	flash_softcpu_bios: Option<PathBuf>,
	#[arg(long = "flash-softcpu-firmware", alias = "flash-lm32-firmware", group = "operation")]
	/// Flash the soft-CPU firmware onto the SPI flash
	flash_softcpu_firmware: Option<PathBuf>,
	#[arg(
		long = "clear-softcpu-firmware",
		alias = "clear-lm32-firmware",
		group = "operation",
		default_value_t = false
	)]
	/// Clear the soft-CPU firmware on the SPI flash
	clear_softcpu_firmware: bool,

	#[arg(long = "backend", default_value = "auto")]
	/// USB enumeration backend: auto, native or lsusb
	backend: BackendChoice,
	#[arg(long = "firmware-dir")]
	/// Look for firmware files here before anywhere else
	firmware_dir: Option<PathBuf>,
	#[arg(long = "completions", value_name = "SHELL")]
	/// Generate completions data for the shell and quit
	completions: Option<Shell>,

	/// Board type implied by the name we were run as
	#[arg(skip)]
	implied_type: Option<BoardType>,
}

impl CliArguments
{
	fn operation(&self) -> Option<Operation>
	{
		if let Some(file) = &self.load_fx2_firmware {
			Some(Operation::LoadFx2Firmware(file.clone()))
		} else if let Some(file) = &self.flash_fx2_eeprom {
			Some(Operation::FlashFx2Eeprom(file.clone()))
		} else if let Some(file) = &self.load_gateware {
			Some(Operation::LoadGateware(file.clone()))
		} else if let Some(file) = &self.flash_gateware {
			Some(Operation::FlashGateware(file.clone()))
		} else if self.reset_gateware {
			Some(Operation::ResetGateware)
		} else if let Some(file) = &self.flash_softcpu_bios {
			Some(Operation::FlashBios(file.clone()))
		} else if let Some(file) = &self.flash_softcpu_firmware {
			Some(Operation::FlashFirmware(file.clone()))
		} else if self.clear_softcpu_firmware {
			Some(Operation::ClearFirmware)
		} else {
			self.flash_image.clone().map(Operation::FlashImage)
		}
	}

	/// The mode to switch to, explicit or implied by a JTAG operation.
	fn target_mode(&self) -> Option<BoardState>
	{
		let needs_jtag = self.get_dna || self.operation().is_some_and(|operation| operation.needs_jtag());
		self.mode.or(needs_jtag.then_some(BoardState::Jtag))
	}

	fn has_query(&self) -> bool
	{
		self.get_usbfs || self.get_sysfs || self.get_state || self.get_serial_device || self.get_dna
	}

	fn timeout(&self) -> Result<Option<Duration>>
	{
		self.timeout
			.map(|seconds| Duration::try_from_secs_f64(seconds).map_err(|_| eyre!("invalid timeout {}", seconds)))
			.transpose()
	}

	fn log_level(&self) -> LevelFilter
	{
		match self.verbose {
			0 => LevelFilter::Warn,
			1 => LevelFilter::Info,
			2 => LevelFilter::Debug,
			_ => LevelFilter::Trace,
		}
	}
}

impl BoardParams for CliArguments
{
	fn board_type(&self) -> Option<BoardType>
	{
		self.by_type.or(self.implied_type)
	}

	fn position(&self) -> Option<PortId>
	{
		self.by_position.clone()
	}
}

/// `opsis-mode-switch` and `atlys-mode-switch` only ever look at their own kind of board.
fn board_type_from_program_name(program: &Path) -> Option<BoardType>
{
	let name = program.file_stem()?.to_str()?;
	let (prefix, _) = name.split_once('-')?;
	prefix.parse().ok()
}

type EyreHookFunc = Box<dyn Fn(&(dyn std::error::Error + 'static)) -> Box<dyn EyreHandler> + Send + Sync + 'static>;
type PanicHookFunc = Box<dyn Fn(&std::panic::PanicHookInfo<'_>) + Send + Sync + 'static>;

struct ModeSwitchHook
{
	inner_hook: EyreHookFunc,
}

struct ModeSwitchPanic
{
	inner_hook: PanicHookFunc,
}

struct ModeSwitchHandler
{
	inner_handler: Box<dyn EyreHandler>,
}

impl ModeSwitchHook
{
	fn build_handler(&self, error: &(dyn std::error::Error + 'static)) -> ModeSwitchHandler
	{
		ModeSwitchHandler {
			inner_handler: (*self.inner_hook)(error),
		}
	}

	pub fn install(self) -> Result<(), InstallError>
	{
		color_eyre::eyre::set_hook(self.into_eyre_hook())
	}

	pub fn into_eyre_hook(self) -> EyreHookFunc
	{
		Box::new(move |err| Box::new(self.build_handler(err)))
	}
}

impl ModeSwitchPanic
{
	pub fn install(self)
	{
		std::panic::set_hook(self.into_panic_hook());
	}

	pub fn into_panic_hook(self) -> PanicHookFunc
	{
		Box::new(move |panic_info| {
			eprintln!("------------[ ✂ cut here ✂ ]------------");
			eprintln!("Unhandled crash in hdmi2usb-mode-switch v{}", crate_version!());
			eprintln!();
			(*self.inner_hook)(panic_info);
			eprintln!();
			eprintln!("{}", "Please include all lines down to this one from the cut here".yellow());
			eprintln!("{}", "marker, and report this issue to our issue tracker at".yellow());
			eprintln!("https://github.com/timvideos/HDMI2USB-mode-switch/issues");
		})
	}
}

impl EyreHandler for ModeSwitchHandler
{
	fn debug(&self, error: &(dyn std::error::Error + 'static), fmt: &mut core::fmt::Formatter<'_>)
	-> core::fmt::Result
	{
		self.inner_handler.debug(error, fmt)?;
		// Flaky JTAG chains are common enough that a second attempt is the first thing to try.
		let retryable = error
			.downcast_ref::<hdmi2usb_modeswitch::error::Error>()
			.is_some_and(|error| error.is_retryable());
		if retryable {
			writeln!(fmt)?;
			writeln!(fmt)?;
			write!(fmt, "{}", "This failure is often transient, running the same command again may work.".yellow())?;
		}
		Ok(())
	}

	fn track_caller(&mut self, location: &'static std::panic::Location<'static>)
	{
		self.inner_handler.track_caller(location);
	}
}

fn install_error_handler() -> Result<()>
{
	let (panic_hook, eyre_hook) = HookBuilder::default().try_into_hooks()?;

	ModeSwitchPanic {
		inner_hook: panic_hook.into_panic_hook(),
	}
	.install();

	ModeSwitchHook {
		inner_hook: eyre_hook.into_eyre_hook(),
	}
	.install()?;
	Ok(())
}

/// Clap v3 style (approximate)
/// See https://stackoverflow.com/a/75343828
fn style() -> clap::builder::Styles
{
	Styles::styled()
		.usage(
			anstyle::Style::new()
				.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)))
				.bold(),
		)
		.header(
			anstyle::Style::new()
				.bold()
				.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
		)
		.literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
}

fn main() -> Result<()>
{
	install_error_handler()?;

	let mut cli_args = CliArguments::parse();
	env_logger::Builder::new()
		.filter_level(cli_args.log_level())
		.parse_default_env()
		.init();

	if let Some(shell) = cli_args.completions {
		let mut cmd = CliArguments::command();
		generate(shell, &mut cmd, "hdmi2usb-mode-switch", &mut stdout());
		return Ok(());
	}

	cli_args.implied_type = env::args_os()
		.next()
		.and_then(|program| board_type_from_program_name(Path::new(&program)));
	if let (Some(implied), Some(requested)) = (cli_args.implied_type, cli_args.by_type) {
		if implied != requested {
			warn!("Invoked as a {} tool but asked for --by-type {}, using {}", implied, requested, requested);
		}
	}

	operations::run(&cli_args)
}
