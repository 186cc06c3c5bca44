//! Connector and agent listing

use axum::{Json, extract::State};
use siphon_core::domain::agent::AgentInfo;
use siphon_engine::ConnectorResolver;

use super::AppState;

/// GET /connectors
/// Local connector ids plus ids advertised by connected agents
pub async fn list_connectors(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .coordinator
            .resolver()
            .connector_ids()
            .into_iter()
            .collect(),
    )
}

/// GET /agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.hub.agents())
}
