use crate::app::logger::LogLevel;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command line for the `statline` binary.
#[derive(Debug, Parser)]
#[command(
    name = "statline",
    about = "Stream host CPU/RAM/disk/GPU telemetry to a small bar-graph display",
    version
)]
pub struct Cli {
    /// Log verbosity: error, warn, info, debug or trace (default: info, or RUST_LOG).
    #[arg(long, global = true, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    /// Append logs to this file instead of stderr (also honors STATLINE_LOG_PATH).
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    /// Read settings from this TOML file instead of the user config.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample this machine and stream metrics to connecting displays.
    Serve(ServeOptions),
    /// Connect to a server and draw the metrics it streams.
    Display(DisplayOptions),
}

/// Options for `serve`; `None` means "use the config file value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ServeOptions {
    /// Address to listen on (default: 0.0.0.0).
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port (default: 9002).
    #[arg(long)]
    pub port: Option<u16>,

    /// Metrics to send: `all` or a list such as `cpu,ram,gpu`.
    #[arg(long)]
    pub metrics: Option<String>,

    /// Delay between frames in milliseconds (default: 250).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: Option<u64>,
}

/// Options for `display`; `None` means "use the config file value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct DisplayOptions {
    /// Server to connect to (default: 127.0.0.1).
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port (default: 9002).
    #[arg(long)]
    pub port: Option<u16>,

    /// Rows to draw: `all` or a list such as `cpu,ram`.
    #[arg(long)]
    pub metrics: Option<String>,

    /// Redraw interval in milliseconds, 500 to 1000 (default: 500).
    #[arg(long, value_parser = clap::value_parser!(u64).range(500..=1000))]
    pub render_ms: Option<u64>,

    /// Longest wait for data per read in milliseconds, 100 to 500 (default: 200).
    #[arg(long, value_parser = clap::value_parser!(u64).range(100..=500))]
    pub poll_ms: Option<u64>,

    /// Sweep a bar from 0 to 99 before connecting.
    #[arg(long)]
    pub boot_test: bool,

    /// Draw into memory only; no terminal output.
    #[arg(long)]
    pub headless: bool,
}

fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    raw.parse().map_err(|err: crate::Error| err.to_string())
}
