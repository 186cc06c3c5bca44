//! Siphon Agent
//!
//! Runs connectors on behalf of the hub.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Registry: Built-in connectors plus Lua scripts from `CONNECTOR_DIR`
//! - Sessions: start/continue/over handling under local dedup rules
//! - Client: Persistent WebSocket to the hub with reconnect backoff
//!
//! The agent registers with the hub, then answers `start` and `continue`
//! requests until the hub rejects it.

mod backoff;
mod client;
mod config;
mod session;

use anyhow::{Context, Result};
use siphon_engine::{
    CrawlContext, JsonFeedConnector, ProcessLauncher, Registry, ResourcePool, RunTracker,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::HubConnection;
use crate::config::Config;
use crate::session::SessionHandler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siphon_agent=info,siphon_engine=info,siphon_lua=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Siphon Agent");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: agent_name={}, hub_url={}",
        config.agent_name, config.hub_url
    );

    let registry = Arc::new(build_registry(&config)?);
    info!("Serving {} connectors", registry.len());
    for id in registry.all_ids() {
        info!("  - {}", id);
    }

    let tracker = Arc::new(RunTracker::new(config.cool_down));
    let mut ctx = CrawlContext::new(registry, tracker);
    if let Some(command) = &config.browser.command {
        let launcher = ProcessLauncher::from_command_line(command, config.browser.profile_dir.clone())
            .context("Invalid BROWSER_COMMAND")?;
        ctx = ctx.with_browser(Arc::new(ResourcePool::new(
            Arc::new(launcher),
            config.browser.max_concurrent,
            config.browser.idle_grace,
        )));
        info!("Browser pool enabled (max {})", config.browser.max_concurrent);
    }

    let handler = Arc::new(SessionHandler::new(Arc::new(ctx), config.session_ttl));
    let connection = HubConnection::new(config, handler);
    connection.run().await
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Built-in connectors plus the Lua scripts in `CONNECTOR_DIR`
fn build_registry(config: &Config) -> Result<Registry> {
    let mut builder = Registry::builder();
    builder.register(JsonFeedConnector::new())?;
    if let Some(dir) = &config.connector_dir {
        siphon_lua::register_dir(&mut builder, dir)?;
    }
    Ok(builder.build())
}
