use clap::{Args, Subcommand};
use std::path::PathBuf;

use powerlog_driver::{connect, DeviceFamily, Instrument};
use powerlog_transport::Connection;

use crate::exit::{driver_error, CliResult};
use crate::output::OutputFormat;

pub mod errors;
pub mod identify;
pub mod log;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log streamed measurements to a file until Ctrl-C.
    Log(LogArgs),
    /// Print the instrument identity.
    Identify(DeviceArgs),
    /// Drain and print the instrument error queue.
    Errors(DeviceArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Log(args) => log::run(args, format),
        Command::Identify(args) => identify::run(args, format),
        Command::Errors(args) => errors::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Analyzer or serial bridge host name.
    pub host: String,
    /// Analyzer family (lmg95, lmg670).
    #[arg(long, short = 'd', default_value = "lmg95")]
    pub device: DeviceFamily,
    /// TCP port. Default: 2001 for lmg95, 5025 for lmg670.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,
}

impl DeviceArgs {
    pub fn peer(&self) -> String {
        format!(
            "{}:{}",
            self.host,
            self.port.unwrap_or_else(|| self.device.default_port())
        )
    }

    pub fn connect(&self) -> CliResult<Instrument<Connection>> {
        tracing::info!(peer = %self.peer(), device = %self.device, "connecting");
        connect(&self.host, self.port, self.device).map_err(|err| driver_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct LogArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Log file to write.
    pub logfile: PathBuf,
    /// Measurement interval in seconds.
    #[arg(long, short = 'i', default_value = "0.5", value_parser = parse_interval)]
    pub interval: f64,
    /// Enable the 60 Hz low-pass filter.
    #[arg(long, short = 'l')]
    pub lowpass: bool,
    /// Echo every frame to stdout instead of a progress counter.
    #[arg(long, short = 'v')]
    pub verbose: bool,
    /// Write the fields as received instead of parsed numbers.
    #[arg(long)]
    pub raw: bool,
    /// Stop after N frames.
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
    /// Current range in amperes.
    #[arg(long, default_value = "10", conflicts_with = "auto_range")]
    pub current: f64,
    /// Voltage range in volts.
    #[arg(long, default_value = "250", conflicts_with = "auto_range")]
    pub voltage: f64,
    /// Leave current and voltage on auto-range (single-channel analyzers only).
    #[arg(long)]
    pub auto_range: bool,
    /// Quantities to log (comma-separated). Default: the family's standard set.
    #[arg(long, value_delimiter = ',')]
    pub values: Option<Vec<String>>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_interval(input: &str) -> Result<f64, String> {
    let seconds: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid interval: {input}"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("interval must be a positive number of seconds".to_string());
    }
    Ok(seconds)
}
