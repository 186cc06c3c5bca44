//! Scheduled sweeps
//!
//! Reads the sweep groups from a JSON file once at startup and sweeps them on
//! a fixed interval.

use anyhow::{Context, Result};
use siphon_core::dto::run::{SweepGroup, SweepOutcome};
use siphon_engine::Sweeper;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Parses a sweep file: a JSON array of `{connector_id, params: [...]}`
pub fn load_groups(path: &Path) -> Result<Vec<SweepGroup>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sweep file {}", path.display()))?;
    let groups: Vec<SweepGroup> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse sweep file {}", path.display()))?;
    Ok(groups)
}

/// Sweeps `groups` every `interval`, forever
pub async fn run_schedule(sweeper: Arc<Sweeper>, groups: Vec<SweepGroup>, interval: Duration) {
    info!(
        "Starting sweep schedule ({} groups, interval: {:?})",
        groups.len(),
        interval
    );

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match sweeper.sweep(&groups).await {
            Ok(SweepOutcome::Completed(report)) => info!(
                succeeded = report.succeeded,
                skipped = report.skipped,
                timed_out = report.timed_out,
                failed = report.failed,
                new_records = report.new_records,
                "scheduled sweep finished"
            ),
            Ok(SweepOutcome::AlreadyRunning) => info!("previous sweep still running, tick skipped"),
            Err(e) => error!("Scheduled sweep stopped by a fatal error: {}", e),
        }
    }
}
