//! Lyrebird CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lyrebird")]
#[command(about = "A Discord bot that copies channel histories through webhooks")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Register the global slash commands on startup
    #[arg(long)]
    register_commands: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Lyrebird...");

    let mut config = if let Some(config_path) = cli.config {
        lyrebird::config::Config::load_from_path(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        lyrebird::config::Config::load().context("failed to load configuration")?
    };

    if cli.register_commands {
        config.discord.register_commands = true;
    }

    let config = Arc::new(config);

    tokio::select! {
        result = lyrebird::discord::run(config) => {
            result.context("discord gateway stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Lyrebird stopped");
    Ok(())
}
