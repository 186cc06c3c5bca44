//! Batch sweeps
//!
//! A sweep runs many (connector, params) pairs in one go. Groups run
//! concurrently on the calling task; the members of one group run one after
//! another with a politeness delay in between, since they usually hit the
//! same site. Only one sweep runs at a time, a concurrent request is a no-op.

use futures::future::join_all;
use serde_json::Value;
use siphon_core::dto::run::{SweepGroup, SweepOutcome, SweepReport};
use siphon_core::{CrawlError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::sink::AlertSink;

pub struct Sweeper {
    coordinator: Arc<Coordinator>,
    alerts: Option<Arc<dyn AlertSink>>,
    politeness_delay: Duration,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag when the sweep ends, including on cancellation
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Sweeper {
    pub fn new(coordinator: Arc<Coordinator>, politeness_delay: Duration) -> Self {
        Self {
            coordinator,
            alerts: None,
            politeness_delay,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Runs every group to completion
    ///
    /// # Errors
    /// The first fatal error (see [`CrawlError::is_fatal`]) of any group. A
    /// fatal error stops only its own group; it is returned once every group
    /// has finished.
    pub async fn sweep(&self, groups: &[SweepGroup]) -> Result<SweepOutcome> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("sweep already in progress, skipping");
            return Ok(SweepOutcome::AlreadyRunning);
        }
        let _guard = InProgress(&self.in_progress);

        info!(groups = groups.len(), "sweep started");
        let results = join_all(groups.iter().map(|group| self.sweep_group(group))).await;

        let mut report = SweepReport::default();
        let mut fatal = None;
        for (group_report, group_fatal) in results {
            report.merge(&group_report);
            if fatal.is_none() {
                fatal = group_fatal;
            }
        }

        info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            timed_out = report.timed_out,
            failed = report.failed,
            new_records = report.new_records,
            "sweep finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(SweepOutcome::Completed(report)),
        }
    }

    async fn sweep_group(&self, group: &SweepGroup) -> (SweepReport, Option<CrawlError>) {
        let mut report = SweepReport::default();
        let members = if group.params.is_empty() {
            vec![Value::Null]
        } else {
            group.params.clone()
        };

        for (i, params) in members.iter().enumerate() {
            if i > 0 && !self.politeness_delay.is_zero() {
                tokio::time::sleep(self.politeness_delay).await;
            }

            match self.coordinator.run(&group.connector_id, params).await {
                Ok(run) => {
                    report.new_records += run.new_records;
                    if run.timed_out {
                        report.timed_out += 1;
                    } else {
                        report.succeeded += 1;
                    }
                }
                Err(CrawlError::Timeout(budget)) => {
                    warn!(connector = %group.connector_id, ?budget, "run timed out before fetching");
                    report.timed_out += 1;
                }
                Err(CrawlError::DuplicateRun(identity)) => {
                    debug!(%identity, "already running or cooling down, skipped");
                    report.skipped += 1;
                }
                Err(e) if e.is_fatal() => {
                    warn!(
                        connector = %group.connector_id,
                        error = %e,
                        "fatal error, abandoning the rest of the group"
                    );
                    report.failed += 1;
                    self.alert(&group.connector_id, &e).await;
                    return (report, Some(e));
                }
                Err(e) => {
                    warn!(connector = %group.connector_id, error = %e, "run failed");
                    report.failed += 1;
                    self.alert(&group.connector_id, &e).await;
                }
            }
        }

        (report, None)
    }

    async fn alert(&self, connector_id: &str, error: &CrawlError) {
        if !error.should_alert() {
            return;
        }
        if let Some(alerts) = &self.alerts {
            alerts.alert(connector_id, error).await;
        }
    }
}
