mod cli;
mod clients;
mod config;
mod logging;
mod node;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::Command;
use crate::config::NodeConfig;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("courier error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let config = NodeConfig::load(&args.config, args.secrets.as_deref())
        .with_context(|| format!("loading config {}", args.config.display()))?;
    debug!(
        config = %args.config.display(),
        secrets = args.secrets.is_some(),
        remotes = config.remotes.len(),
        "config loaded"
    );

    match args.command {
        Command::Serve { loopback } => node::serve(config, loopback).await,
        Command::DeadLetters { kind } => node::dead_letters(config, kind).await,
        Command::Purge { kind, id } => node::purge(config, kind, id).await,
    }
}
