//! Shared state handed to every run
//!
//! Contains what connectors and the coordinator need during a run:
//! - Frozen connector registry
//! - Run tracker for admission and cool-down
//! - HTTP client reused across connectors
//! - Optional browser pool for sources that need a rendered page

use std::sync::Arc;
use std::time::Duration;

use crate::pool::ResourcePool;
use crate::registry::Registry;
use crate::tracker::RunTracker;
use tracing::warn;

/// Per-request limit of the default HTTP client
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide crawl context
pub struct CrawlContext {
    pub registry: Arc<Registry>,
    pub tracker: Arc<RunTracker>,
    pub http: reqwest::Client,
    browser: Option<Arc<ResourcePool>>,
}

impl CrawlContext {
    /// Creates a context with a default HTTP client and no browser pool
    ///
    /// The default client gives up on a request after [`HTTP_TIMEOUT`].
    pub fn new(registry: Arc<Registry>, tracker: Arc<RunTracker>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            registry,
            tracker,
            http,
            browser: None,
        }
    }

    /// Context with a fresh tracker, used by tests and one-off runs
    pub fn with_cool_down(registry: Registry, cool_down: Duration) -> Self {
        Self::new(Arc::new(registry), Arc::new(RunTracker::new(cool_down)))
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_browser(mut self, pool: Arc<ResourcePool>) -> Self {
        self.browser = Some(pool);
        self
    }

    pub fn browser(&self) -> Option<&Arc<ResourcePool>> {
        self.browser.as_ref()
    }
}
