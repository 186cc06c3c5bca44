//! Source metadata
//!
//! One record per logical source, upserted by the sink before any article of
//! that source is stored.

use serde::{Deserialize, Serialize};

/// Who may read a source's artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    Restricted,
    Private,
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Public
    }
}

/// Describes a source produced by a connector instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Key the sink files this source's records under (the run identity key)
    #[serde(default)]
    pub source_id: String,

    pub name: String,

    pub link: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Name of the record field used as sort key
    pub sort_key: String,

    #[serde(default)]
    pub access: AccessLevel,
}

fn default_language() -> String {
    "en".to_string()
}

impl SourceMeta {
    pub fn new(name: impl Into<String>, link: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            source_id: String::new(),
            name: name.into(),
            link: link.into(),
            description: String::new(),
            language: default_language(),
            sort_key: sort_key.into(),
            access: AccessLevel::Public,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
