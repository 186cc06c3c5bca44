//! Resume markers and traversal preferences

use serde::{Deserialize, Serialize};

use super::article::SortValue;

/// Where the last successful fetch of a source left off
///
/// Either a bootstrap request (`amount`: return the N most recent records) or
/// a resume marker (`sortKey`/`title` of the last persisted record). With
/// neither set, the caller has no marker at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocateInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<usize>,

    #[serde(rename = "sortKey", default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<SortValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl LocateInfo {
    /// Bootstrap flags: the `amount` most recent records
    pub fn bootstrap(amount: usize) -> Self {
        Self {
            amount: Some(amount),
            ..Default::default()
        }
    }

    /// Resume flags from the last persisted record
    pub fn resume(sort_key: impl Into<SortValue>, title: Option<String>) -> Self {
        Self {
            amount: None,
            sort_key: Some(sort_key.into()),
            title,
        }
    }

    /// The resume marker, if any
    pub fn marker(&self) -> Option<&SortValue> {
        self.sort_key.as_ref()
    }

    /// Preference a caller uses when it has no explicit one
    pub fn default_preference(&self) -> SequencePreference {
        if self.amount.is_some() {
            SequencePreference::PreferNew2Old
        } else {
            SequencePreference::PreferOld2New
        }
    }
}

/// Requested traversal direction for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencePreference {
    #[serde(rename = "PREFER_NEW2OLD")]
    PreferNew2Old,
    #[serde(rename = "MUST_NEW2OLD")]
    MustNew2Old,
    #[serde(rename = "PREFER_OLD2NEW")]
    PreferOld2New,
    #[serde(rename = "MUST_OLD2NEW")]
    MustOld2New,
}

impl SequencePreference {
    pub fn is_old2new(self) -> bool {
        matches!(
            self,
            SequencePreference::PreferOld2New | SequencePreference::MustOld2New
        )
    }

    pub fn is_mandatory(self) -> bool {
        matches!(
            self,
            SequencePreference::MustNew2Old | SequencePreference::MustOld2New
        )
    }
}

impl Default for SequencePreference {
    fn default() -> Self {
        SequencePreference::PreferNew2Old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_wire_shape() {
        let json = serde_json::to_value(LocateInfo::bootstrap(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "amount": 3 }));
    }

    #[test]
    fn test_resume_wire_shape() {
        let flags: LocateInfo =
            serde_json::from_str(r#"{"sortKey": 25, "title": "last one"}"#).unwrap();
        assert_eq!(flags.marker(), Some(&SortValue::Int(25)));
        assert_eq!(flags.title.as_deref(), Some("last one"));
        assert_eq!(flags.default_preference(), SequencePreference::PreferOld2New);
    }

    #[test]
    fn test_preference_names() {
        let json = serde_json::to_string(&SequencePreference::MustOld2New).unwrap();
        assert_eq!(json, "\"MUST_OLD2NEW\"");
        assert!(SequencePreference::MustOld2New.is_old2new());
        assert!(!SequencePreference::PreferNew2Old.is_old2new());
    }
}
