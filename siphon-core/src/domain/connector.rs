//! Connector descriptor
//!
//! Static capability flags of a connector. These are declared by each
//! connector implementation and never inferred at runtime.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default politeness interval for a connector (10 minutes)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// Describes a connector and its capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    /// Unique connector identifier
    pub id: String,

    /// Whether instances require construction parameters
    pub is_variety: bool,

    /// Whether the connector can enumerate oldest-to-newest from a marker
    pub supports_old2new: bool,

    /// Politeness interval between runs of this connector
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Upper bound for a single fetch pass; falls back to `interval`
    #[serde(default, with = "option_duration_secs")]
    pub max_wait: Option<Duration>,
}

impl ConnectorDescriptor {
    /// Creates a descriptor for a connector without parameters
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_variety: false,
            supports_old2new: false,
            interval: DEFAULT_INTERVAL,
            max_wait: None,
        }
    }

    /// Marks the connector as requiring per-instance parameters
    pub fn variety(mut self) -> Self {
        self.is_variety = true;
        self
    }

    /// Marks the connector as able to enumerate oldest-to-newest natively
    pub fn old2new(mut self) -> Self {
        self.supports_old2new = true;
        self
    }

    /// Sets the politeness interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the fetch budget
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Time budget for one fetch pass of this connector
    pub fn fetch_budget(&self) -> Duration {
        self.max_wait.unwrap_or(self.interval)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_budget_falls_back_to_interval() {
        let desc = ConnectorDescriptor::new("alpha").with_interval(Duration::from_secs(60));
        assert_eq!(desc.fetch_budget(), Duration::from_secs(60));

        let desc = desc.with_max_wait(Duration::from_secs(5));
        assert_eq!(desc.fetch_budget(), Duration::from_secs(5));
    }

    #[test]
    fn test_builder_flags() {
        let desc = ConnectorDescriptor::new("beta").variety().old2new();
        assert!(desc.is_variety);
        assert!(desc.supports_old2new);
    }
}
