//! Siphon HTTP Client
//!
//! A small, typed client for the Siphon hub API, used by the CLI.
//!
//! # Example
//!
//! ```no_run
//! use siphon_client::HubClient;
//! use serde_json::json;
//!
//! # async fn example() -> siphon_client::Result<()> {
//! let client = HubClient::new("http://localhost:8080");
//!
//! let report = client.run("jsonfeed", json!({"url": "https://example.com/feed.json"})).await?;
//! println!("{} new records in {}", report.new_records, report.source_id);
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use siphon_core::domain::agent::AgentInfo;
use siphon_core::dto::run::{RunReport, RunRequest, SweepGroup, SweepOutcome};
use siphon_core::identity::Delegation;
use tracing::debug;

/// A cached artifact as served by the hub
#[derive(Debug, Clone)]
pub struct ArtifactResponse {
    pub content_type: String,
    pub body: String,
}

/// LuaLS stub file served by the hub
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StubFile {
    pub name: String,
    pub content: String,
}

/// HTTP client for the Siphon hub API
#[derive(Debug, Clone)]
pub struct HubClient {
    /// Base URL of the hub (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl HubClient {
    /// Create a new hub client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new hub client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the hub
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Listing
    // =============================================================================

    /// Check that the hub is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    /// Connector ids the hub can run, locally or through an agent
    pub async fn connectors(&self) -> Result<Vec<String>> {
        self.get_json("/connectors").await
    }

    /// Agents currently connected to the hub
    pub async fn agents(&self) -> Result<Vec<AgentInfo>> {
        self.get_json("/agents").await
    }

    // =============================================================================
    // Runs
    // =============================================================================

    /// Run one connector now
    pub async fn run(&self, connector_id: &str, params: Value) -> Result<RunReport> {
        let req = RunRequest {
            connector_id: connector_id.to_string(),
            params,
        };
        self.post_json("/run", &req).await
    }

    /// Run one connector on an agent, optionally a named one
    pub async fn delegate(
        &self,
        connector_id: &str,
        params: Value,
        agent: Option<String>,
    ) -> Result<RunReport> {
        let req = Delegation {
            agent,
            connector_id: connector_id.to_string(),
            params,
        };
        self.post_json("/delegate", &req).await
    }

    /// Run a batch of connector groups
    pub async fn sweep(&self, groups: &[SweepGroup]) -> Result<SweepOutcome> {
        self.post_json("/sweep", groups).await
    }

    /// Fetch the cached artifact of a source
    pub async fn artifact(&self, source_id: &str) -> Result<ArtifactResponse> {
        let url = self.url(&format!("/artifact/{}", source_id));
        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response.text().await?;
        Ok(ArtifactResponse { content_type, body })
    }

    /// LuaLS stubs for connector scripts
    pub async fn stubs(&self) -> Result<StubFile> {
        self.get_json("/stubs").await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    /// Turns a non-success status into an [`ClientError::ApiError`]
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ClientError::api_error(status.as_u16(), error_text))
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }
}
