//! CLI definitions for Adjutant.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Adjutant CLI.
#[derive(Parser)]
#[command(name = "adjutant")]
#[command(about = "Personal assistant runtime")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the assistant in the foreground (default)
    Run,

    /// Validate the configuration and print the result
    CheckConfig,
}

impl Cli {
    /// Resolved config path: the flag, or `~/.adjutant/config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".adjutant")
                .join("config.toml")
        })
    }
}
