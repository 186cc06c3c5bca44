//! Execution coordinator
//!
//! Drives one admitted run end to end:
//! 1. open the run (admit, resolve, create)
//! 2. upsert the source metadata
//! 3. derive resume flags from the newest stored record
//! 4. stream records through the sync protocol into the sink
//! 5. rebuild the artifact when something changed or nothing is cached
//!
//! Steps 2-4 share the connector's fetch budget. Running out of budget is not
//! an error: the report comes back with `timed_out` set. The instance is
//! destroyed and the identity enters refractory on every exit path.

use futures::TryStreamExt;
use serde_json::Value;
use siphon_core::domain::locate::{LocateInfo, SequencePreference};
use siphon_core::domain::source::SourceMeta;
use siphon_core::dto::run::RunReport;
use siphon_core::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::CrawlContext;
use crate::registry::ConnectorResolver;
use crate::run::{OpenRun, open_run};
use crate::sink::{Artifact, ArtifactBuilder, ArtifactStore, JsonFeedBuilder, MemoryArtifactStore, Sink};

/// Tunables of the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Records requested from a source with nothing stored yet
    pub bootstrap_amount: usize,

    /// Newest records rendered into an artifact
    pub artifact_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bootstrap_amount: 20,
            artifact_size: 50,
        }
    }
}

pub struct Coordinator {
    ctx: Arc<CrawlContext>,
    resolver: Arc<dyn ConnectorResolver>,
    sink: Arc<dyn Sink>,
    builder: Arc<dyn ArtifactBuilder>,
    artifacts: Arc<dyn ArtifactStore>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Coordinator rendering JSON Feed artifacts into an in-memory cache
    pub fn new(
        ctx: Arc<CrawlContext>,
        resolver: Arc<dyn ConnectorResolver>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            ctx,
            resolver,
            sink,
            builder: Arc::new(JsonFeedBuilder),
            artifacts: Arc::new(MemoryArtifactStore::new()),
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_artifacts(
        mut self,
        builder: Arc<dyn ArtifactBuilder>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        self.builder = builder;
        self.artifacts = artifacts;
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.ctx
    }

    pub fn resolver(&self) -> &Arc<dyn ConnectorResolver> {
        &self.resolver
    }

    /// Cached artifact of a source
    pub async fn artifact(&self, source_id: &str) -> Option<Artifact> {
        self.artifacts.get(source_id).await
    }

    /// Runs `connector_id` with `params` to completion
    ///
    /// # Errors
    /// Admission, resolution and creation errors from [`open_run`], and any
    /// sink or stream error during the run.
    pub async fn run(&self, connector_id: &str, params: &Value) -> Result<RunReport> {
        self.run_with(self.resolver.as_ref(), connector_id, params).await
    }

    /// Like [`Coordinator::run`], resolving the connector through `resolver`
    ///
    /// Admission still goes through the shared tracker, so a run resolved
    /// elsewhere dedups against runs of the same identity.
    pub async fn run_with(
        &self,
        resolver: &dyn ConnectorResolver,
        connector_id: &str,
        params: &Value,
    ) -> Result<RunReport> {
        let run = open_run(&self.ctx, resolver, connector_id, params).await?;
        let meta = run.source_meta();
        let budget = run.descriptor().fetch_budget();

        let mut report = RunReport {
            connector_id: connector_id.to_string(),
            source_id: meta.source_id.clone(),
            ..Default::default()
        };

        let outcome = tokio::time::timeout(budget, self.drive(&run, &meta, &mut report)).await;
        run.close().await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(
                    connector = connector_id,
                    source = %meta.source_id,
                    ?budget,
                    stored = report.new_records,
                    "run exceeded its fetch budget"
                );
                report.timed_out = true;
            }
        }

        self.refresh_artifact(&meta, &mut report).await?;
        info!(
            connector = connector_id,
            source = %report.source_id,
            new_records = report.new_records,
            artifact_rebuilt = report.artifact_rebuilt,
            timed_out = report.timed_out,
            "run finished"
        );
        Ok(report)
    }

    async fn drive(&self, run: &OpenRun, meta: &SourceMeta, report: &mut RunReport) -> Result<()> {
        self.sink.exist_source_meta(meta).await?;

        let (flags, preference) = self.locate(meta).await?;
        debug!(source = %meta.source_id, ?flags, ?preference, "resume flags");

        let mut records = run.fetch(&flags, preference);
        while let Some(record) = records.try_next().await? {
            if self.sink.store(&meta.source_id, &record).await? {
                report.new_records += 1;
            }
        }
        Ok(())
    }

    /// Bootstrap flags for an empty source, otherwise resume from the newest record
    async fn locate(&self, meta: &SourceMeta) -> Result<(LocateInfo, SequencePreference)> {
        let newest = self
            .sink
            .top_n_by_key(&meta.source_id, 1, &meta.sort_key)
            .await?;

        let flags = match newest.into_iter().next() {
            None => LocateInfo::bootstrap(self.config.bootstrap_amount),
            Some(record) => LocateInfo::resume(record.sort_key, Some(record.title)),
        };
        let preference = flags.default_preference();
        Ok((flags, preference))
    }

    async fn refresh_artifact(&self, meta: &SourceMeta, report: &mut RunReport) -> Result<()> {
        if report.new_records == 0 && self.artifacts.get(&meta.source_id).await.is_some() {
            return Ok(());
        }

        let records = self
            .sink
            .top_n_by_key(&meta.source_id, self.config.artifact_size, &meta.sort_key)
            .await?;
        let artifact = self.builder.build(meta, &records)?;
        self.artifacts.put(artifact).await;
        report.artifact_rebuilt = true;
        Ok(())
    }
}
