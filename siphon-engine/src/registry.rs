//! Connector registry
//!
//! Connectors are registered once at startup through a [`RegistryBuilder`];
//! [`RegistryBuilder::build`] freezes the set so lookups need no locking.

use siphon_core::{CrawlError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::connector::Connector;

/// Source of connectors for a run
///
/// The local [`Registry`] is the plain implementation; the hub layers
/// delegation to remote agents on top of it.
pub trait ConnectorResolver: Send + Sync {
    /// Connector for `connector_id`, `None` if nothing can serve it
    fn resolve(&self, connector_id: &str) -> Option<Arc<dyn Connector>>;

    /// All connector ids this resolver can serve
    fn connector_ids(&self) -> BTreeSet<String>;
}

/// Mutable registry used during startup
#[derive(Default)]
pub struct RegistryBuilder {
    connectors: BTreeMap<String, Arc<dyn Connector>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector under its descriptor id
    ///
    /// # Errors
    /// `DuplicateRegistration` if a connector with the same id is already
    /// registered.
    pub fn register<C: Connector + 'static>(&mut self, connector: C) -> Result<&mut Self> {
        self.register_arc(Arc::new(connector))
    }

    /// Registers an already shared connector
    pub fn register_arc(&mut self, connector: Arc<dyn Connector>) -> Result<&mut Self> {
        let id = connector.descriptor().id.clone();
        if self.connectors.contains_key(&id) {
            return Err(CrawlError::DuplicateRegistration(id));
        }
        debug!(connector = %id, "registered connector");
        self.connectors.insert(id, connector);
        Ok(self)
    }

    /// Freezes the registry
    pub fn build(self) -> Registry {
        Registry {
            connectors: self.connectors,
        }
    }
}

/// Frozen id -> connector map
#[derive(Default)]
pub struct Registry {
    connectors: BTreeMap<String, Arc<dyn Connector>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, connector_id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(connector_id).cloned()
    }

    pub fn contains(&self, connector_id: &str) -> bool {
        self.connectors.contains_key(connector_id)
    }

    pub fn all_ids(&self) -> BTreeSet<String> {
        self.connectors.keys().cloned().collect()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Arc<dyn Connector>> {
        self.connectors.values()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl ConnectorResolver for Registry {
    fn resolve(&self, connector_id: &str) -> Option<Arc<dyn Connector>> {
        self.get(connector_id)
    }

    fn connector_ids(&self) -> BTreeSet<String> {
        self.all_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ConnectorInstance;
    use crate::context::CrawlContext;
    use async_trait::async_trait;
    use serde_json::Value;
    use siphon_core::domain::connector::ConnectorDescriptor;

    struct Named(ConnectorDescriptor);

    #[async_trait]
    impl Connector for Named {
        fn descriptor(&self) -> &ConnectorDescriptor {
            &self.0
        }

        async fn create(
            &self,
            _ctx: &CrawlContext,
            _params: &Value,
        ) -> Result<Box<dyn ConnectorInstance>> {
            Err(CrawlError::Unknown("not used".into()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut builder = Registry::builder();
        builder
            .register(Named(ConnectorDescriptor::new("alpha")))
            .unwrap()
            .register(Named(ConnectorDescriptor::new("beta")))
            .unwrap();
        let registry = builder.build();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("gamma").is_none());
        assert_eq!(
            registry.connector_ids().into_iter().collect::<Vec<_>>(),
            vec!["alpha", "beta"]
        );
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut builder = Registry::builder();
        builder
            .register(Named(ConnectorDescriptor::new("alpha")))
            .unwrap();
        let err = builder
            .register(Named(ConnectorDescriptor::new("alpha")))
            .err()
            .unwrap();
        assert_eq!(err, CrawlError::DuplicateRegistration("alpha".into()));
        assert_eq!(err.code(), 500);
    }
}
