//! Siphon CLI
//!
//! Command-line interface for interacting with the Siphon hub.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "siphon")]
#[command(about = "Siphon crawl hub CLI", long_about = None)]
struct Cli {
    /// Hub URL
    #[arg(long, env = "SIPHON_HUB_URL", default_value = "http://localhost:8080")]
    hub_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        hub_url: cli.hub_url,
    };

    handle_command(cli.command, &config).await
}
