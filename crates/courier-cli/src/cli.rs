//! CLI argument definitions using clap.

use clap::{Parser, ValueEnum};

/// courier - typed in-process message dispatch demo
#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    about = "Walks through registering handlers and dispatching messages with courier"
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, env = "COURIER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", env = "COURIER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Delay before the deferred dispatch fires, in milliseconds
    #[arg(long, default_value = "100", env = "COURIER_DELAY_MS")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}
