use clap::Parser;
use std::path::PathBuf;

use crate::config::Provider;

/// Command line arguments for the sketch-tutor binary.
///
/// Every flag overrides the matching value from the config file.
#[derive(Parser, Clone, Debug, Default)]
#[command(name = "sketch-tutor", about = "Canvas drawing assistant server")]
pub struct Args {
    /// TOML configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long = "base-url")]
    pub base_url: Option<String>,
    /// Default filter when `RUST_LOG` is unset.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}
