//! Agent domain model
//!
//! Represents a remote agent connected to the hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connected agent as seen by the hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent name, validated against the known-agents directory
    pub name: String,

    /// Relative weight used when choosing among agents
    pub weight: u32,

    /// Connector ids the agent advertised at registration
    pub connector_ids: Vec<String>,

    /// When the current channel was established
    pub connected_at: DateTime<Utc>,
}
