//! Run and sweep DTOs
//!
//! Payloads of the hub HTTP API for interactive runs and batch sweeps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to run a single connector now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub connector_id: String,
    #[serde(default)]
    pub params: Value,
}

/// Result of one completed connector run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub connector_id: String,

    /// Sink key of the source (the run identity key)
    pub source_id: String,

    /// Records stored by this run
    pub new_records: usize,

    /// Whether the artifact builder was invoked
    pub artifact_rebuilt: bool,

    /// Whether the fetch was abandoned at its time budget
    pub timed_out: bool,
}

/// One sweep group: members run sequentially, groups run concurrently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepGroup {
    pub connector_id: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Counters of a finished sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub new_records: usize,
}

impl SweepReport {
    /// Adds another group's counters to this report
    pub fn merge(&mut self, other: &SweepReport) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.timed_out += other.timed_out;
        self.failed += other.failed;
        self.new_records += other.new_records;
    }
}

/// Outcome of a sweep request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// Another sweep was in progress; this request did nothing
    AlreadyRunning,
    Completed(SweepReport),
}
