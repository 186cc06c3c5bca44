//! Connectors hosted on agents
//!
//! [`RemoteConnector`] looks like any other connector to the coordinator.
//! Creating an instance sends `start` to a selected agent; the one fetch pass
//! sends `continue` and turns the `articles` reply into a record stream. The
//! agent applies the resume flags itself, so the native enumeration methods
//! are never used.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::locate::{LocateInfo, SequencePreference};
use siphon_core::domain::source::SourceMeta;
use siphon_core::dto::wire::WireMessage;
use siphon_core::{CrawlError, Result, RunIdentity};
use siphon_engine::{Connector, ConnectorInstance, ConnectorResolver, CrawlContext, RecordStream, Registry};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::hub::{AgentHub, AgentLink};

/// Proxy for a connector that runs on an agent
pub struct RemoteConnector {
    descriptor: ConnectorDescriptor,
    hub: Arc<AgentHub>,
    agent: Option<String>,
}

impl RemoteConnector {
    pub fn new(connector_id: &str, hub: Arc<AgentHub>) -> Self {
        // Creation and the fetch pass each wait up to one reply timeout.
        let descriptor = ConnectorDescriptor::new(connector_id)
            .variety()
            .with_max_wait(hub.reply_timeout() * 2);
        Self {
            descriptor,
            hub,
            agent: None,
        }
    }

    /// Restricts agent selection to `agent`
    pub fn on_agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent;
        self
    }
}

#[async_trait]
impl Connector for RemoteConnector {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    async fn create(
        &self,
        _ctx: &CrawlContext,
        params: &Value,
    ) -> Result<Box<dyn ConnectorInstance>> {
        let connector_id = &self.descriptor.id;
        let request_id = RunIdentity::new(connector_id, params).key();
        if self.hub.in_flight(&request_id) {
            return Err(CrawlError::DuplicateRun(format!(
                "{} is already running on an agent",
                connector_id
            )));
        }
        let link = self.hub.select(connector_id, self.agent.as_deref())?;

        let reply = self
            .hub
            .request(
                &link,
                WireMessage::Start {
                    request_id: request_id.clone(),
                    connector_id: connector_id.clone(),
                    params: params.clone(),
                },
            )
            .await;

        match reply {
            WireMessage::SourceInfo { meta, .. } => {
                debug!(agent = link.name(), connector = %connector_id, request_id = %request_id, "remote instance created");
                Ok(Box::new(RemoteInstance {
                    hub: Arc::clone(&self.hub),
                    link,
                    request_id,
                    meta,
                    settled: AtomicBool::new(false),
                }))
            }
            WireMessage::Over { .. } => Err(CrawlError::RequestFailed(format!(
                "agent '{}' did not start '{}'",
                link.name(),
                connector_id
            ))),
            other => {
                self.hub.notify(&link, WireMessage::over(request_id)).await;
                Err(CrawlError::RequestFailed(format!(
                    "unexpected '{}' reply to start",
                    other.kind()
                )))
            }
        }
    }
}

/// Session of a connector instance held by an agent
struct RemoteInstance {
    hub: Arc<AgentHub>,
    link: AgentLink,
    request_id: String,
    meta: SourceMeta,
    /// Set once the agent has released or been told to release the session
    settled: AtomicBool,
}

#[async_trait]
impl ConnectorInstance for RemoteInstance {
    fn describe(&self) -> SourceMeta {
        self.meta.clone()
    }

    fn new_to_old(&self) -> RecordStream<'_> {
        stream::once(async {
            Err(CrawlError::Unknown(
                "remote instances enumerate on their agent".to_string(),
            ))
        })
        .boxed()
    }

    fn fetch<'a>(
        &'a self,
        _descriptor: &'a ConnectorDescriptor,
        flags: &'a LocateInfo,
        _preference: SequencePreference,
    ) -> RecordStream<'a> {
        stream::once(async move {
            // The agent releases the session after answering a continue.
            self.settled.store(true, Ordering::SeqCst);
            let reply = self
                .hub
                .request(
                    &self.link,
                    WireMessage::Continue {
                        request_id: self.request_id.clone(),
                        flags: flags.clone(),
                    },
                )
                .await;

            match reply {
                WireMessage::Articles { articles, .. } => Ok(articles),
                WireMessage::Over { .. } => Ok(Vec::new()),
                other => Err(CrawlError::RequestFailed(format!(
                    "unexpected '{}' reply to continue",
                    other.kind()
                ))),
            }
        })
        .map_ok(|articles| stream::iter(articles.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn destroy(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.hub
                .notify(&self.link, WireMessage::over(self.request_id.clone()))
                .await;
        }
    }
}

/// Resolves every connector id to an agent
pub struct AgentResolver {
    hub: Arc<AgentHub>,
    agent: Option<String>,
}

impl AgentResolver {
    pub fn new(hub: Arc<AgentHub>, agent: Option<String>) -> Self {
        Self { hub, agent }
    }
}

impl ConnectorResolver for AgentResolver {
    fn resolve(&self, connector_id: &str) -> Option<Arc<dyn Connector>> {
        Some(Arc::new(
            RemoteConnector::new(connector_id, Arc::clone(&self.hub)).on_agent(self.agent.clone()),
        ))
    }

    fn connector_ids(&self) -> BTreeSet<String> {
        self.hub.connector_ids()
    }
}

/// Local registry first, agents for delegated or locally unknown connectors
pub struct HubResolver {
    registry: Arc<Registry>,
    hub: Arc<AgentHub>,
    delegated: HashSet<String>,
}

impl HubResolver {
    pub fn new(registry: Arc<Registry>, hub: Arc<AgentHub>, delegated: HashSet<String>) -> Self {
        for id in &delegated {
            if registry.contains(id) {
                debug!(connector = %id, "local connector delegated to agents");
            }
        }
        Self {
            registry,
            hub,
            delegated,
        }
    }
}

impl ConnectorResolver for HubResolver {
    fn resolve(&self, connector_id: &str) -> Option<Arc<dyn Connector>> {
        let delegated = self.delegated.contains(connector_id);
        if !delegated {
            if let Some(connector) = self.registry.get(connector_id) {
                return Some(connector);
            }
            if !self.hub.serves(connector_id) {
                warn!(connector = connector_id, "no local connector and no agent serves it");
                return None;
            }
        }
        Some(Arc::new(RemoteConnector::new(
            connector_id,
            Arc::clone(&self.hub),
        )))
    }

    fn connector_ids(&self) -> BTreeSet<String> {
        let mut ids = self.registry.connector_ids();
        ids.extend(self.hub.connector_ids());
        ids.extend(self.delegated.iter().cloned());
        ids
    }
}
