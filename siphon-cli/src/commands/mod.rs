//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod init;
mod list;
mod run;

pub use init::InitCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List connectors the hub can run
    Connectors,
    /// List connected agents
    Agents,
    /// Run one connector now
    Run {
        /// Connector id
        connector: String,

        /// Parameters as a JSON value
        #[arg(short, long)]
        params: Option<String>,

        /// Run on an agent instead of wherever the hub resolves it
        #[arg(long)]
        delegate: bool,

        /// Pin the delegated run to a named agent (implies --delegate)
        #[arg(long)]
        agent: Option<String>,
    },
    /// Run the sweep groups listed in a JSON file
    Sweep {
        /// JSON file holding an array of {connector_id, params}
        file: PathBuf,
    },
    /// Print the cached artifact of a source
    Artifact {
        /// Source id as reported by `run`
        source_id: String,
    },
    /// Initialize development environment
    Init {
        #[command(subcommand)]
        command: InitCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Connectors => list::list_connectors(config).await,
        Commands::Agents => list::list_agents(config).await,
        Commands::Run {
            connector,
            params,
            delegate,
            agent,
        } => run::run_connector(config, &connector, params.as_deref(), delegate, agent).await,
        Commands::Sweep { file } => run::sweep(config, &file).await,
        Commands::Artifact { source_id } => run::print_artifact(config, &source_id).await,
        Commands::Init { command } => init::handle_init_command(command, config).await,
    }
}
