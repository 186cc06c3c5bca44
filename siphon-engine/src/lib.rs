//! Siphon Engine
//!
//! Crawl orchestration shared by the hub and its agents.
//!
//! Architecture:
//! - Connector: capability trait implemented by every source adapter
//! - Registry: connector lookup, built once at startup and frozen
//! - Sync: adapts a connector's native enumeration order to the caller's needs
//! - Tracker: per-identity admission (running, then refractory for a cool-down)
//! - Coordinator: drives one admitted run through the sink and artifact builder
//! - Sweep: batch runs of many connectors with per-group politeness
//! - Pool: bounded leasing of a shared headless browser engine

pub mod connector;
pub mod connectors;
pub mod context;
pub mod coordinator;
pub mod pool;
pub mod registry;
pub mod run;
pub mod sink;
pub mod sweep;
pub mod sync;
pub mod tracker;

pub use connector::{Connector, ConnectorInstance, RecordStream, required_param};
pub use connectors::JsonFeedConnector;
pub use context::CrawlContext;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use pool::{Engine, EngineLauncher, ExecutionContext, Lease, ProcessLauncher, ResourcePool};
pub use registry::{ConnectorResolver, Registry, RegistryBuilder};
pub use run::{OpenRun, open_run};
pub use sink::{
    AlertSink, Artifact, ArtifactBuilder, ArtifactStore, JsonFeedBuilder, LogAlertSink,
    MemoryArtifactStore, MemorySink, Sink,
};
pub use sweep::Sweeper;
pub use tracker::{RunGuard, RunPhase, RunTracker};
