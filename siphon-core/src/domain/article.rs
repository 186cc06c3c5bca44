//! Article domain model
//!
//! An article is one record produced by a connector. Every record carries a
//! designated sort key which orders it within its source's timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A single record produced by a connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Record title
    pub title: String,

    /// Short summary or excerpt
    pub summary: String,

    /// Canonical link to the record
    pub link: String,

    /// Optional cover image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Optional full content (HTML or plain text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Optional chapter label for serialized sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,

    /// Publication time, when the source exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    /// Value of the source's designated sort key
    pub sort_key: SortValue,
}

impl ArticleRecord {
    /// Creates a record with the required fields only
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        link: impl Into<String>,
        sort_key: impl Into<SortValue>,
    ) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            link: link.into(),
            image: None,
            content: None,
            chapter: None,
            published: None,
            sort_key: sort_key.into(),
        }
    }

    /// Sets the publication time
    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }

    /// Sets the content body
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Comparable value of a record's sort key
///
/// Integers, floats and timestamps all compare numerically with each other
/// (timestamps as epoch seconds). Text only compares with text and sorts after
/// every numeric value.
#[derive(Debug, Clone)]
pub enum SortValue {
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Text(String),
}

impl SortValue {
    /// Numeric view of the value, timestamps as fractional epoch seconds
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SortValue::Int(i) => Some(*i as f64),
            SortValue::Float(f) => Some(*f),
            SortValue::Time(t) => Some(t.timestamp_millis() as f64 / 1000.0),
            SortValue::Text(_) => None,
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => Some(a.cmp(b)),
            (SortValue::Time(a), SortValue::Time(b)) => Some(a.cmp(b)),
            (SortValue::Text(a), SortValue::Text(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                (Some(_), None) => Some(Ordering::Less),
                (None, Some(_)) => Some(Ordering::Greater),
                (None, None) => None,
            },
        }
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for SortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortValue::Int(i) => write!(f, "{}", i),
            SortValue::Float(v) => write!(f, "{}", v),
            SortValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
            SortValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for SortValue {
    fn from(value: i64) -> Self {
        SortValue::Int(value)
    }
}

impl From<f64> for SortValue {
    fn from(value: f64) -> Self {
        SortValue::Float(value)
    }
}

impl From<DateTime<Utc>> for SortValue {
    fn from(value: DateTime<Utc>) -> Self {
        SortValue::Time(value)
    }
}

impl From<String> for SortValue {
    fn from(value: String) -> Self {
        SortValue::Text(value)
    }
}

impl From<&str> for SortValue {
    fn from(value: &str) -> Self {
        SortValue::Text(value.to_string())
    }
}

// Timestamps go over the wire as epoch-seconds numbers.
impl Serialize for SortValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SortValue::Int(i) => serializer.serialize_i64(*i),
            SortValue::Float(f) => serializer.serialize_f64(*f),
            SortValue::Time(t) => {
                if t.timestamp_subsec_millis() == 0 {
                    serializer.serialize_i64(t.timestamp())
                } else {
                    serializer.serialize_f64(t.timestamp_millis() as f64 / 1000.0)
                }
            }
            SortValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSortValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for SortValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawSortValue::deserialize(deserializer)? {
            RawSortValue::Int(i) => SortValue::Int(i),
            RawSortValue::Float(f) => SortValue::Float(f),
            RawSortValue::Text(s) => SortValue::Text(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_numeric_kinds_compare_with_each_other() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(SortValue::Int(1_699_999_999) < SortValue::Time(t));
        assert!(SortValue::Float(1_700_000_000.5) > SortValue::Time(t));
        assert_eq!(SortValue::Int(1_700_000_000), SortValue::Time(t));
    }

    #[test]
    fn test_text_sorts_after_numbers() {
        assert!(SortValue::Int(i64::MAX) < SortValue::from("a"));
        assert!(SortValue::from("a") < SortValue::from("b"));
    }

    #[test]
    fn test_time_serializes_as_epoch_seconds() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let json = serde_json::to_value(SortValue::Time(t)).unwrap();
        assert_eq!(json, serde_json::json!(1_700_000_000));

        // The receiving side only sees a number, which still compares correctly.
        let back: SortValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, SortValue::Time(t));
    }

    #[test]
    fn test_article_optional_fields_are_omitted() {
        let article = ArticleRecord::new("t", "s", "https://example.com/1", 7);
        let json = serde_json::to_value(&article).unwrap();
        assert!(json.get("image").is_none());
        assert_eq!(json["sort_key"], 7);
    }
}
