use anyhow::Context;
use siphon_engine::{
    Coordinator, CoordinatorConfig, CrawlContext, JsonFeedConnector, LogAlertSink, MemorySink,
    ProcessLauncher, Registry, ResourcePool, RunTracker, Sweeper,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod hub;
pub mod remote;
pub mod schedule;

use api::AppState;
use config::Config;
use hub::{AgentHub, StaticDirectory};
use remote::HubResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "siphon_hub=info,siphon_engine=info,siphon_lua=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Siphon Hub...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let registry = Arc::new(build_registry(&config)?);
    tracing::info!("Registered {} local connectors", registry.len());

    let tracker = Arc::new(
        RunTracker::new(config.cool_down).with_exempt(config.exempt_connectors.iter().cloned()),
    );
    let mut ctx = CrawlContext::new(Arc::clone(&registry), tracker);
    if let Some(command) = &config.browser.command {
        let launcher = ProcessLauncher::from_command_line(command, config.browser.profile_dir.clone())
            .context("Invalid BROWSER_COMMAND")?;
        ctx = ctx.with_browser(Arc::new(ResourcePool::new(
            Arc::new(launcher),
            config.browser.max_concurrent,
            config.browser.idle_grace,
        )));
        tracing::info!("Browser pool enabled (max {})", config.browser.max_concurrent);
    }

    if config.known_agents.is_empty() {
        tracing::warn!("KNOWN_AGENTS is empty, every agent registration will be rejected");
    }
    let hub = Arc::new(AgentHub::new(
        StaticDirectory::new(config.known_agents.clone()),
        config.reply_timeout,
    ));
    let resolver = HubResolver::new(
        Arc::clone(&registry),
        Arc::clone(&hub),
        config.delegated_connectors.clone(),
    );

    let coordinator = Arc::new(
        Coordinator::new(Arc::new(ctx), Arc::new(resolver), Arc::new(MemorySink::new()))
            .with_config(CoordinatorConfig {
                bootstrap_amount: config.bootstrap_amount,
                ..Default::default()
            }),
    );
    let sweeper = Arc::new(
        Sweeper::new(Arc::clone(&coordinator), config.politeness_delay)
            .with_alerts(Arc::new(LogAlertSink)),
    );

    if let Some(path) = &config.sweep_file {
        let groups = schedule::load_groups(path)?;
        tokio::spawn(schedule::run_schedule(
            Arc::clone(&sweeper),
            groups,
            config.sweep_interval,
        ));
    }

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        coordinator,
        sweeper,
        hub,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

/// Built-in connectors plus the Lua scripts in `CONNECTOR_DIR`
fn build_registry(config: &Config) -> anyhow::Result<Registry> {
    let mut builder = Registry::builder();
    builder.register(JsonFeedConnector::new())?;
    if let Some(dir) = &config.connector_dir {
        siphon_lua::register_dir(&mut builder, dir)?;
    }
    Ok(builder.build())
}
