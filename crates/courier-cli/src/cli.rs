//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `courier`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "courier",
    version,
    about = "Durable retry engine for tag replication and blob write-back.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the node config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "courier.toml", global = true)]
    pub config: PathBuf,

    /// Optional secrets file (TOML), merged over the config file.
    #[arg(long, value_name = "PATH", global = true)]
    pub secrets: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `COURIER_LOG`, then `RUST_LOG`, then `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the tag replication and write-back managers until Ctrl-C.
    Serve {
        /// Make every remote call succeed locally instead of failing.
        #[arg(long)]
        loopback: bool,
    },

    /// List abandoned tasks as JSON lines.
    DeadLetters {
        /// Only this task kind (e.g. `courier.tag.replicate.v1`).
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
    },

    /// Delete one abandoned task.
    Purge {
        /// Task kind.
        kind: String,
        /// Task id, as printed by `dead-letters`.
        id: String,
    },
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

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
