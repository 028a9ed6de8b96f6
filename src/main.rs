//! Adjutant - personal assistant runtime.
//!
//! Entry point: configuration, tracing, and the run/check-config
//! commands.

mod app;
mod cli;
mod model_client;
mod stdio_transport;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adjutant_config::{Config, ConfigLoader, ConfigValidator};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config_path();

    let config = if config_path.exists() {
        ConfigLoader::load(&config_path)
            .with_context(|| format!("loading config from {:?}", config_path))?
    } else {
        warn!("no config file at {:?}, using defaults", config_path);
        Config::default()
    };

    match cli.command {
        Some(Commands::CheckConfig) => {
            let result = ConfigValidator::validate(&config);
            for warning in &result.warnings {
                println!("warning: {}: {}", warning.path, warning.message);
            }
            for error in &result.errors {
                println!("error: {}: {}", error.path, error.message);
            }
            if result.is_valid() {
                info!("configuration at {:?} is valid", config_path);
                Ok(())
            } else {
                anyhow::bail!("{} error(s) in {:?}", result.errors.len(), config_path);
            }
        }
        Some(Commands::Run) | None => app::run(config).await,
    }
}
