//! Listing command handlers

use anyhow::Result;
use colored::*;
use siphon_client::HubClient;
use siphon_core::domain::agent::AgentInfo;

use crate::config::Config;

/// List connector ids the hub can run
pub async fn list_connectors(config: &Config) -> Result<()> {
    let client = HubClient::new(&config.hub_url);
    let ids = client.connectors().await?;

    if ids.is_empty() {
        println!("{}", "No connectors available.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} connector(s):", ids.len()).bold());
    println!();
    for id in ids {
        println!("  {} {}", "▸".cyan(), id);
    }
    Ok(())
}

/// List agents connected to the hub
pub async fn list_agents(config: &Config) -> Result<()> {
    let client = HubClient::new(&config.hub_url);
    let agents = client.agents().await?;

    if agents.is_empty() {
        println!("{}", "No agents connected.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} connected agent(s):", agents.len()).bold()
        );
        println!();
        for agent in agents {
            print_agent(&agent);
        }
    }
    Ok(())
}

fn print_agent(agent: &AgentInfo) {
    println!("  {} Agent {}", "▸".cyan(), agent.name.bold());
    println!("    Weight:       {}", agent.weight);
    println!(
        "    Connected:    {}",
        agent
            .connected_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if agent.connector_ids.is_empty() {
        println!("    Connectors:   {}", "none".dimmed());
    } else {
        println!("    Connectors:   {}", agent.connector_ids.join(", "));
    }
    println!();
}
