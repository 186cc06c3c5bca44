//! Connector capability interface
//!
//! A connector is a pluggable source adapter. The connector itself is a
//! stateless factory registered once at startup; each run creates an instance
//! from the caller's parameters, enumerates records lazily and is destroyed
//! when the run ends.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use siphon_core::domain::article::{ArticleRecord, SortValue};
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::locate::{LocateInfo, SequencePreference};
use siphon_core::domain::source::SourceMeta;
use siphon_core::{CrawlError, Result};

use crate::context::CrawlContext;
use crate::sync;

/// Lazily produced records; dropping the stream cancels the enumeration
pub type RecordStream<'a> = BoxStream<'a, Result<ArticleRecord>>;

/// Factory for connector instances
#[async_trait]
pub trait Connector: Send + Sync {
    /// Static capabilities of this connector
    fn descriptor(&self) -> &ConnectorDescriptor;

    /// Creates an instance for the given parameters
    ///
    /// # Errors
    /// - `InvalidParameters` if the parameters fail validation
    /// - `RequestFailed` if a network or parse step fails during creation
    async fn create(&self, ctx: &CrawlContext, params: &Value)
    -> Result<Box<dyn ConnectorInstance>>;
}

/// A live connector instance bound to one set of parameters
#[async_trait]
pub trait ConnectorInstance: Send + Sync {
    /// Metadata of the source this instance reads
    fn describe(&self) -> SourceMeta;

    /// Native enumeration, newest record first
    fn new_to_old(&self) -> RecordStream<'_>;

    /// Native oldest-first enumeration strictly after `after`
    ///
    /// Only called when the descriptor declares `supports_old2new`.
    fn old_to_new<'a>(&'a self, _after: Option<&'a SortValue>) -> RecordStream<'a> {
        stream::once(async {
            Err(CrawlError::Unknown(
                "connector has no native old2new enumeration".to_string(),
            ))
        })
        .boxed()
    }

    /// Records after the resume point in the requested order
    ///
    /// The default adapts the native streams; proxies that fetch elsewhere
    /// override it.
    fn fetch<'a>(
        &'a self,
        descriptor: &'a ConnectorDescriptor,
        flags: &'a LocateInfo,
        preference: SequencePreference,
    ) -> RecordStream<'a> {
        sync::fetch(self, descriptor, flags, preference)
    }

    /// Releases held resources; safe to call more than once
    async fn destroy(&self) {}
}

/// Reads a required string parameter from a params object
pub fn required_param<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CrawlError::InvalidParameters(format!("missing parameter '{}'", name)))
}
