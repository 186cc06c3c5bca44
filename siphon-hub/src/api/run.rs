//! Run API Handlers
//!
//! Interactive runs, delegated runs, sweeps and artifact lookup.

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use siphon_core::dto::run::{RunReport, RunRequest, SweepGroup, SweepOutcome};
use siphon_core::identity::Delegation;
use std::sync::Arc;

use super::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::remote::AgentResolver;

/// POST /run
/// Run one connector now
pub async fn run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> ApiResult<Json<RunReport>> {
    tracing::info!("Running connector: {}", req.connector_id);

    let report = state.coordinator.run(&req.connector_id, &req.params).await?;
    Ok(Json(report))
}

/// POST /delegate
/// Run one connector on an agent, optionally a specific one
pub async fn delegate(
    State(state): State<AppState>,
    Json(req): Json<Delegation>,
) -> ApiResult<Json<RunReport>> {
    tracing::info!(
        "Delegating connector {} to {}",
        req.connector_id,
        req.agent.as_deref().unwrap_or("any agent")
    );

    let resolver = AgentResolver::new(Arc::clone(&state.hub), req.agent.clone());
    let report = state
        .coordinator
        .run_with(&resolver, &req.connector_id, &req.params)
        .await?;
    Ok(Json(report))
}

/// POST /sweep
/// Run a batch of connector groups
pub async fn sweep(
    State(state): State<AppState>,
    Json(groups): Json<Vec<SweepGroup>>,
) -> ApiResult<Json<SweepOutcome>> {
    if groups.is_empty() {
        return Err(ApiError::BadRequest("sweep needs at least one group".to_string()));
    }
    tracing::info!("Sweeping {} groups", groups.len());

    let outcome = state.sweeper.sweep(&groups).await?;
    Ok(Json(outcome))
}

/// GET /artifact/{source_id}
/// Cached artifact of a source, with its own content type
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!("Getting artifact: {}", source_id);

    let artifact = state
        .coordinator
        .artifact(&source_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No artifact for source {}", source_id)))?;

    Ok(([(header::CONTENT_TYPE, artifact.content_type)], artifact.body))
}
