//! Admitted, created connector instance
//!
//! [`open_run`] applies the admission rules shared by the hub's coordinator
//! and the agent's session handler: admit the identity, resolve the
//! connector, create the instance. The resulting [`OpenRun`] owns both the
//! instance and the run guard, so closing it destroys the instance before the
//! identity enters its refractory phase.

use futures::TryStreamExt;
use serde_json::Value;
use siphon_core::domain::article::ArticleRecord;
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::locate::{LocateInfo, SequencePreference};
use siphon_core::domain::source::SourceMeta;
use siphon_core::{CrawlError, Result, RunIdentity};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connector::{ConnectorInstance, RecordStream};
use crate::context::CrawlContext;
use crate::registry::ConnectorResolver;
use crate::tracker::RunGuard;

/// Admits and creates a run of `connector_id` with `params`
///
/// # Errors
/// - `DuplicateRun` if the identity is running or refractory
/// - `NotFound` if no connector serves `connector_id`
/// - `Timeout` if `create` outlasts the connector's fetch budget
/// - whatever the connector reports from `create`
pub async fn open_run(
    ctx: &CrawlContext,
    resolver: &dyn ConnectorResolver,
    connector_id: &str,
    params: &Value,
) -> Result<OpenRun> {
    let identity = RunIdentity::new(connector_id, params);
    let guard = ctx.tracker.admit(identity.clone())?;

    let connector = resolver
        .resolve(connector_id)
        .ok_or_else(|| CrawlError::NotFound(connector_id.to_string()))?;
    let descriptor = connector.descriptor().clone();

    let budget = descriptor.fetch_budget();
    let instance = match tokio::time::timeout(budget, connector.create(ctx, params)).await {
        Ok(created) => created,
        Err(_) => Err(CrawlError::Timeout(budget)),
    }
    .inspect_err(|e| {
        warn!(%identity, error = %e, "connector instance creation failed");
    })?;
    debug!(%identity, "run opened");

    Ok(OpenRun {
        identity,
        descriptor,
        instance: Arc::from(instance),
        guard: Some(guard),
        closed: false,
    })
}

/// A live run: instance plus admission guard
pub struct OpenRun {
    identity: RunIdentity,
    descriptor: ConnectorDescriptor,
    instance: Arc<dyn ConnectorInstance>,
    guard: Option<RunGuard>,
    closed: bool,
}

impl OpenRun {
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    /// Key the sink files this run's records under
    pub fn source_id(&self) -> String {
        self.identity.key()
    }

    /// Source metadata with `source_id` filled in
    pub fn source_meta(&self) -> SourceMeta {
        let mut meta = self.instance.describe();
        meta.source_id = self.source_id();
        meta
    }

    /// Lazy record stream after the resume point
    pub fn fetch<'a>(
        &'a self,
        flags: &'a LocateInfo,
        preference: SequencePreference,
    ) -> RecordStream<'a> {
        self.instance.fetch(&self.descriptor, flags, preference)
    }

    /// One buffered fetch pass bounded by the connector's fetch budget
    ///
    /// # Errors
    /// `Timeout` when the budget elapses, otherwise the first stream error.
    pub async fn collect(
        &self,
        flags: &LocateInfo,
        preference: SequencePreference,
    ) -> Result<Vec<ArticleRecord>> {
        let budget = self.descriptor.fetch_budget();
        match tokio::time::timeout(budget, self.fetch(flags, preference).try_collect()).await {
            Ok(records) => records,
            Err(_) => Err(CrawlError::Timeout(budget)),
        }
    }

    /// Destroys the instance, then releases the identity into refractory
    pub async fn close(mut self) {
        self.closed = true;
        self.instance.destroy().await;
        self.guard.take();
        debug!(identity = %self.identity, "run closed");
    }
}

impl Drop for OpenRun {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let instance = Arc::clone(&self.instance);
        let guard = self.guard.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    instance.destroy().await;
                    drop(guard);
                });
            }
            Err(_) => {
                warn!(identity = %self.identity, "run dropped outside a runtime, instance not destroyed");
                drop(guard);
            }
        }
    }
}
