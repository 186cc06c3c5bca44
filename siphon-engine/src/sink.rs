//! Collaborators a run reports into
//!
//! The coordinator stores records through a [`Sink`], renders the cached
//! output with an [`ArtifactBuilder`] into an [`ArtifactStore`], and reports
//! sweep failures to an [`AlertSink`]. Storage backends live outside this
//! crate; the in-memory implementations here back the hub by default and the
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use siphon_core::domain::article::ArticleRecord;
use siphon_core::domain::source::SourceMeta;
use siphon_core::{CrawlError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

/// Record persistence for one source at a time
#[async_trait]
pub trait Sink: Send + Sync {
    /// Inserts or updates the source metadata
    async fn exist_source_meta(&self, meta: &SourceMeta) -> Result<()>;

    /// Stores a record, keyed by its link within the source
    ///
    /// Returns `true` if the record was not stored before.
    async fn store(&self, source_id: &str, record: &ArticleRecord) -> Result<bool>;

    /// The `n` records with the greatest `key`, greatest first
    async fn top_n_by_key(&self, source_id: &str, n: usize, key: &str)
    -> Result<Vec<ArticleRecord>>;
}

/// Rendered, cacheable output of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub source_id: String,
    pub content_type: String,
    pub body: String,
    pub built_at: DateTime<Utc>,
}

/// Renders a source's newest records
pub trait ArtifactBuilder: Send + Sync {
    fn build(&self, meta: &SourceMeta, records: &[ArticleRecord]) -> Result<Artifact>;
}

/// Cache of built artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, source_id: &str) -> Option<Artifact>;
    async fn put(&self, artifact: Artifact);
}

/// Receives non-fatal failures that should reach an operator
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, connector_id: &str, error: &CrawlError);
}

#[derive(Default)]
struct SourceEntry {
    meta: Option<SourceMeta>,
    records: Vec<ArticleRecord>,
}

/// Sink kept in process memory
#[derive(Default)]
pub struct MemorySink {
    sources: Mutex<HashMap<String, SourceEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored metadata of a source
    pub fn meta(&self, source_id: &str) -> Option<SourceMeta> {
        self.lock().get(source_id).and_then(|s| s.meta.clone())
    }

    /// All records of a source in insertion order
    pub fn records(&self, source_id: &str) -> Vec<ArticleRecord> {
        self.lock()
            .get(source_id)
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SourceEntry>> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn exist_source_meta(&self, meta: &SourceMeta) -> Result<()> {
        self.lock()
            .entry(meta.source_id.clone())
            .or_default()
            .meta = Some(meta.clone());
        Ok(())
    }

    async fn store(&self, source_id: &str, record: &ArticleRecord) -> Result<bool> {
        let mut sources = self.lock();
        let entry = sources.entry(source_id.to_string()).or_default();
        match entry.records.iter_mut().find(|r| r.link == record.link) {
            Some(existing) => {
                *existing = record.clone();
                Ok(false)
            }
            None => {
                entry.records.push(record.clone());
                Ok(true)
            }
        }
    }

    async fn top_n_by_key(
        &self,
        source_id: &str,
        n: usize,
        _key: &str,
    ) -> Result<Vec<ArticleRecord>> {
        let sources = self.lock();
        let Some(entry) = sources.get(source_id) else {
            return Ok(Vec::new());
        };

        let mut records = entry.records.clone();
        records.sort_by(|a, b| {
            b.sort_key
                .partial_cmp(&a.sort_key)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        records.truncate(n);
        Ok(records)
    }
}

/// Renders artifacts as JSON Feed 1.1 documents
pub struct JsonFeedBuilder;

impl ArtifactBuilder for JsonFeedBuilder {
    fn build(&self, meta: &SourceMeta, records: &[ArticleRecord]) -> Result<Artifact> {
        let items: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "id": r.link,
                    "url": r.link,
                    "title": r.title,
                    "summary": r.summary,
                    "content_html": r.content,
                    "image": r.image,
                    "date_published": r.published.map(|p| p.to_rfc3339()),
                })
            })
            .collect();

        let feed = json!({
            "version": "https://jsonfeed.org/version/1.1",
            "title": meta.name,
            "home_page_url": meta.link,
            "description": meta.description,
            "language": meta.language,
            "items": items,
        });

        Ok(Artifact {
            source_id: meta.source_id.clone(),
            content_type: "application/feed+json".to_string(),
            body: serde_json::to_string(&feed)?,
            built_at: Utc::now(),
        })
    }
}

/// Artifact cache kept in process memory
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, source_id: &str) -> Option<Artifact> {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_id)
            .cloned()
    }

    async fn put(&self, artifact: Artifact) {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(artifact.source_id.clone(), artifact);
    }
}

/// Alerts written to the log
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, connector_id: &str, error: &CrawlError) {
        if error.code() >= 500 {
            error!(connector = connector_id, kind = error.kind(), "{}", error);
        } else {
            warn!(connector = connector_id, kind = error.kind(), "{}", error);
        }
    }
}
