//! Run, sweep and artifact command handlers

use anyhow::{Context, Result};
use colored::*;
use serde_json::Value;
use siphon_client::HubClient;
use siphon_core::dto::run::{RunReport, SweepGroup, SweepOutcome};
use std::fs;
use std::path::Path;

use crate::config::Config;

/// Run one connector, locally on the hub or delegated to an agent
pub async fn run_connector(
    config: &Config,
    connector: &str,
    params: Option<&str>,
    delegate: bool,
    agent: Option<String>,
) -> Result<()> {
    let client = HubClient::new(&config.hub_url);
    let params = parse_params(params)?;

    let report = if delegate || agent.is_some() {
        println!(
            "{} {} on {}",
            "Delegating".cyan(),
            connector.bold(),
            agent.as_deref().unwrap_or("any agent")
        );
        client.delegate(connector, params, agent).await?
    } else {
        println!("{} {}", "Running".cyan(), connector.bold());
        client.run(connector, params).await?
    };

    print_report(&report);
    Ok(())
}

/// Run the groups listed in a JSON file
pub async fn sweep(config: &Config, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read sweep file {}", file.display()))?;
    let groups: Vec<SweepGroup> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse sweep file {}", file.display()))?;

    let client = HubClient::new(&config.hub_url);
    println!("{} {} group(s)", "Sweeping".cyan(), groups.len());

    match client.sweep(&groups).await? {
        SweepOutcome::AlreadyRunning => {
            println!("{}", "A sweep is already in progress; nothing was run.".yellow());
        }
        SweepOutcome::Completed(report) => {
            println!("{}", "✓ Sweep completed".green().bold());
            println!("  Succeeded:    {}", report.succeeded.to_string().green());
            println!("  Skipped:      {}", report.skipped.to_string().yellow());
            println!("  Timed out:    {}", report.timed_out.to_string().yellow());
            println!("  Failed:       {}", report.failed.to_string().red());
            println!("  New records:  {}", report.new_records);
        }
    }
    Ok(())
}

/// Print the cached artifact of a source to stdout
pub async fn print_artifact(config: &Config, source_id: &str) -> Result<()> {
    let client = HubClient::new(&config.hub_url);
    let artifact = client.artifact(source_id).await?;
    eprintln!("{} {}", "Content-Type:".dimmed(), artifact.content_type.dimmed());
    println!("{}", artifact.body);
    Ok(())
}

/// Parses `--params`; absent means null
fn parse_params(params: Option<&str>) -> Result<Value> {
    match params {
        Some(raw) => serde_json::from_str(raw).context("--params must be valid JSON"),
        None => Ok(Value::Null),
    }
}

fn print_report(report: &RunReport) {
    println!("{}", "✓ Run completed".green().bold());
    println!("  Source:       {}", report.source_id.bold());
    println!("  New records:  {}", report.new_records);
    println!(
        "  Artifact:     {}",
        if report.artifact_rebuilt {
            "rebuilt".green()
        } else {
            "unchanged".dimmed()
        }
    );
    if report.timed_out {
        println!("  {}", "Fetch stopped at its time budget".yellow());
    }
}
