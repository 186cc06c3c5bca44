//! Canonical run identities
//!
//! Two requests with the same connector id and equivalent parameters are the
//! same logical run. Equivalence is decided on a canonical serialization of the
//! parameters (object keys sorted, empty containers folded to `null`), never on
//! structural equality of arbitrary nested values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical identity of one concrete connector execution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunIdentity {
    connector_id: String,
    canonical_params: String,
}

impl RunIdentity {
    pub fn new(connector_id: impl Into<String>, params: &Value) -> Self {
        let mut canonical_params = String::new();
        write_canonical(&normalize(params), &mut canonical_params);
        Self {
            connector_id: connector_id.into(),
            canonical_params,
        }
    }

    pub fn connector_id(&self) -> &str {
        &self.connector_id
    }

    /// Stable serialization of (connector id, params)
    pub fn canonical(&self) -> String {
        let mut out = String::from("[");
        write_canonical(&Value::String(self.connector_id.clone()), &mut out);
        out.push(',');
        out.push_str(&self.canonical_params);
        out.push(']');
        out
    }

    /// Hex SHA-256 of the canonical serialization
    ///
    /// Used as the sink's source id and as the remote request id, so identical
    /// logical requests always map to the same key.
    pub fn key(&self) -> String {
        format!("{:x}", Sha256::digest(self.canonical().as_bytes()))
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.connector_id, self.canonical_params)
    }
}

/// A connector run delegated to a remote agent
///
/// The target agent is part of the envelope only; the identity is derived
/// from the wrapped (connector id, params).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(default)]
    pub agent: Option<String>,
    pub connector_id: String,
    #[serde(default)]
    pub params: Value,
}

impl Delegation {
    pub fn identity(&self) -> RunIdentity {
        RunIdentity::new(&self.connector_id, &self.params)
    }
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) if items.is_empty() => Value::Null,
        Value::Object(map) if map.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String(key.clone()), out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = RunIdentity::new("bili", &json!({"uid": 1, "kind": "video"}));
        let b = RunIdentity::new("bili", &json!({"kind": "video", "uid": 1}));
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_empty_params_are_equivalent() {
        let a = RunIdentity::new("static", &Value::Null);
        let b = RunIdentity::new("static", &json!({}));
        let c = RunIdentity::new("static", &json!([]));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_different_connectors_differ() {
        let a = RunIdentity::new("a", &json!([1]));
        let b = RunIdentity::new("b", &json!([1]));
        assert_ne!(a, b);
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key().len(), 64);
    }

    #[test]
    fn test_delegation_ignores_envelope() {
        let local = RunIdentity::new("weibo", &json!({"user": "42"}));
        let remote = Delegation {
            agent: Some("edge-1".to_string()),
            connector_id: "weibo".to_string(),
            params: json!({"user": "42"}),
        };
        assert_eq!(remote.identity(), local);
    }
}
