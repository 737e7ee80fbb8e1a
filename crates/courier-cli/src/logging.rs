//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `COURIER_LOG` environment variable (full `EnvFilter` syntax)
//! 3. `RUST_LOG`
//! 4. `info`
//!
//! Logs go to stderr so `dead-letters` output on stdout stays parseable.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level)?)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_filter()));
    }
    for var in ["COURIER_LOG", "RUST_LOG"] {
        if let Ok(directives) = std::env::var(var)
            && !directives.trim().is_empty()
        {
            return EnvFilter::try_new(&directives)
                .map_err(|e| anyhow!("invalid {var} filter {directives:?}: {e}"));
        }
    }
    Ok(EnvFilter::new("info"))
}
