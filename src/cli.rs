// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `watchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchrun",
    version,
    about = "Run commands when files in watched directories change.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory to watch (repeatable). Prefix with '-' to exclude a
    /// directory instead, e.g. `-w src -w -src/generated`.
    ///
    /// Defaults to the current working directory when omitted.
    #[arg(short = 'w', long = "watch", value_name = "DIR", allow_hyphen_values = true)]
    pub watch: Vec<String>,

    /// File suffix to watch (repeatable). Prefix with '-' to ignore a
    /// suffix instead, e.g. `-e .go -e -_test.go`.
    ///
    /// When no plain suffixes are given, all suffixes are watched.
    #[arg(short = 'e', long = "ext", value_name = "SUFFIX", allow_hyphen_values = true)]
    pub ext: Vec<String>,

    /// Directory names that are never watched (repeatable).
    ///
    /// When omitted, the built-in ignore list (version control metadata,
    /// IDE state, `node_modules`, ...) is used; passing the flag replaces
    /// that list entirely.
    #[arg(short = 'I', long = "ignore-list", value_name = "DIR")]
    pub ignore_list: Vec<String>,

    /// Minimum time between two dispatched reloads, e.g. `100ms`, `2s`.
    #[arg(long, value_name = "DURATION", default_value = "100ms")]
    pub cooldown: String,

    /// Attach the command to the terminal's stdin and give it foreground
    /// control.
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Run the configured commands concurrently instead of in order.
    #[arg(long)]
    pub parallel: bool,

    /// Shell command to run on every change (repeatable). Each occurrence
    /// becomes one step of the command group.
    #[arg(short = 'c', long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// Push change events to HTTP subscribers instead of running a command.
    #[arg(long)]
    pub sse: bool,

    /// Listen address for the notification endpoint.
    #[arg(long = "sse-addr", value_name = "ADDR", default_value = "127.0.0.1:12345")]
    pub sse_addr: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Command and arguments to run on every change (after `--`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub exec: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
