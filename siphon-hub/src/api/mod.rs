//! API Module
//!
//! HTTP API layer for the hub.
//! Each submodule handles endpoints for a specific domain.

pub mod agent_ws;
pub mod agents;
pub mod error;
pub mod health;
pub mod run;
pub mod stubs;

use axum::{
    Router,
    routing::{get, post},
};
use siphon_engine::{Coordinator, Sweeper};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::hub::AgentHub;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub sweeper: Arc<Sweeper>,
    pub hub: Arc<AgentHub>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Listing endpoints
        .route("/connectors", get(agents::list_connectors))
        .route("/agents", get(agents::list_agents))
        // Run endpoints
        .route("/run", post(run::run))
        .route("/delegate", post(run::delegate))
        .route("/sweep", post(run::sweep))
        .route("/artifact/{source_id}", get(run::get_artifact))
        // Connector authoring
        .route("/stubs", get(stubs::get_stubs))
        // Agent channel
        .route("/agent/ws", get(agent_ws::agent_ws))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::StaticDirectory;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use futures::stream::{self, StreamExt};
    use serde_json::{Value, json};
    use siphon_core::domain::article::ArticleRecord;
    use siphon_core::domain::connector::ConnectorDescriptor;
    use siphon_core::domain::source::SourceMeta;
    use siphon_core::{Result, RunIdentity};
    use siphon_engine::{
        Connector, ConnectorInstance, CrawlContext, MemorySink, RecordStream, Registry, RunTracker,
    };
    use std::collections::{BTreeMap, HashSet};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::remote::HubResolver;

    struct Countdown(ConnectorDescriptor);

    struct CountdownInstance;

    #[async_trait]
    impl Connector for Countdown {
        fn descriptor(&self) -> &ConnectorDescriptor {
            &self.0
        }

        async fn create(
            &self,
            _ctx: &CrawlContext,
            _params: &Value,
        ) -> Result<Box<dyn ConnectorInstance>> {
            Ok(Box::new(CountdownInstance))
        }
    }

    #[async_trait]
    impl ConnectorInstance for CountdownInstance {
        fn describe(&self) -> SourceMeta {
            SourceMeta::new("Countdown", "https://countdown.example", "sort_key")
        }

        fn new_to_old(&self) -> RecordStream<'_> {
            stream::iter((1..=3).rev().map(|n: i64| {
                Ok(ArticleRecord::new(
                    format!("#{}", n),
                    "",
                    format!("https://countdown.example/{}", n),
                    n,
                ))
            }))
            .boxed()
        }
    }

    pub(crate) fn state() -> AppState {
        let mut builder = Registry::builder();
        builder
            .register(Countdown(ConnectorDescriptor::new("countdown")))
            .unwrap();
        let registry = Arc::new(builder.build());
        let ctx = Arc::new(CrawlContext::new(
            Arc::clone(&registry),
            Arc::new(RunTracker::new(Duration::from_secs(60))),
        ));
        let hub = Arc::new(AgentHub::new(
            StaticDirectory::new(BTreeMap::from([("edge-1".to_string(), 1)])),
            Duration::from_secs(1),
        ));
        let resolver = HubResolver::new(registry, Arc::clone(&hub), HashSet::new());
        let coordinator = Arc::new(Coordinator::new(
            ctx,
            Arc::new(resolver),
            Arc::new(MemorySink::new()),
        ));
        let sweeper = Arc::new(Sweeper::new(Arc::clone(&coordinator), Duration::ZERO));

        AppState {
            coordinator,
            sweeper,
            hub,
        }
    }

    fn app() -> Router {
        create_router(state())
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_run_then_duplicate_then_artifact() {
        let app = app();

        let resp = app
            .clone()
            .oneshot(post_json("/run", json!({"connector_id": "countdown"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["new_records"], 3);
        let source_id = RunIdentity::new("countdown", &Value::Null).key();
        assert_eq!(report["source_id"], source_id.as_str());

        let resp = app
            .clone()
            .oneshot(post_json("/run", json!({"connector_id": "countdown", "params": {}})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(resp).await["kind"], "duplicate_run");

        let req = Request::builder()
            .uri(format!("/artifact/{}", source_id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/feed+json"
        );
        let feed = body_json(resp).await;
        assert_eq!(feed["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_connector_is_bad_request() {
        let resp = app()
            .oneshot(post_json("/run", json!({"connector_id": "nope"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["kind"], "not_found");
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_delegate_without_agents_is_unavailable() {
        let resp = app()
            .oneshot(post_json(
                "/delegate",
                json!({"agent": "edge-1", "connector_id": "countdown"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await["kind"], "lack_agent");
    }

    #[tokio::test]
    async fn test_sweep_and_listing() {
        let app = app();

        let resp = app.clone().oneshot(post_json("/sweep", json!([]))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(post_json("/sweep", json!([{"connector_id": "countdown"}])))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = body_json(resp).await;
        assert_eq!(outcome["status"], "completed");
        assert_eq!(outcome["succeeded"], 1);
        assert_eq!(outcome["new_records"], 3);

        let req = Request::builder().uri("/connectors").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await, json!(["countdown"]));

        let req = Request::builder().uri("/agents").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await, json!([]));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let req = Request::builder()
            .uri("/artifact/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
