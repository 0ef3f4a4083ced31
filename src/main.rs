//! Maestro - container fleet orchestration CLI.
//!
//! Parses an environment description (ships, services, containers) and
//! drives a fleet of Docker daemons through it: pulling images, starting
//! and stopping containers in dependency order, and reporting status.

use anyhow::Result;
use clap::Parser;
use tracing::error;

mod cmd;

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Container fleet orchestration")]
#[command(version)]
struct Cli {
    /// Path to the environment description (`-` reads from stdin).
    #[arg(short = 'f', long = "file", default_value = "maestro.yaml")]
    file: String,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: cmd::Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("maestro={}", log_level).into()),
        )
        .init();

    let config = maestro::config::load(&cli.file)?;
    let ctx = cmd::CommandContext::build(config)?;

    if let Err(e) = cmd::dispatch(cli.command, ctx).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
