//! Data types for source records, indexed chunks, and search results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar metadata value attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Convert a JSON value into a scalar, rejecting arrays, objects and null.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(MetadataValue::Integer(i)),
                None => n.as_f64().map(MetadataValue::Float),
            },
            serde_json::Value::String(s) => Some(MetadataValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Ordered metadata map. Ordering keeps serialized output deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A retrievable text unit fetched from a document source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// The text content of the record.
    pub content: String,
    /// Key-value metadata such as source id, page or section.
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentRecord {
    /// Create a record with no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: Metadata::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A [`DocumentRecord`] with its vector embedding, owned by a
/// [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    /// Stable identifier derived from the record's position in the build input.
    pub id: String,
    /// The embedded record.
    pub record: DocumentRecord,
    /// The vector embedding for the record's content.
    pub embedding: Vec<f32>,
}

/// A retrieved record paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    /// The text content of the matched record.
    pub content: String,
    /// Metadata of the matched record.
    pub metadata: Metadata,
    /// Cosine similarity between the query and the record (higher is more relevant).
    pub score: f32,
}

impl ScoredResult {
    pub(crate) fn from_chunk(chunk: &IndexedChunk, score: f32) -> Self {
        Self { content: chunk.record.content.clone(), metadata: chunk.record.metadata.clone(), score }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn metadata_deserializes_scalars_untagged() {
        let record: DocumentRecord = serde_json::from_value(json!({
            "content": "Scope 1 emissions fell 10%",
            "metadata": {"doc": "A", "page": 4, "weight": 0.5, "audited": true}
        }))
        .unwrap();

        assert_eq!(record.metadata["doc"], MetadataValue::Text("A".into()));
        assert_eq!(record.metadata["page"], MetadataValue::Integer(4));
        assert_eq!(record.metadata["weight"], MetadataValue::Float(0.5));
        assert_eq!(record.metadata["audited"], MetadataValue::Bool(true));
    }

    #[test]
    fn from_json_rejects_non_scalars() {
        assert!(MetadataValue::from_json(&json!(null)).is_none());
        assert!(MetadataValue::from_json(&json!([1, 2])).is_none());
        assert!(MetadataValue::from_json(&json!({"a": 1})).is_none());
        assert_eq!(MetadataValue::from_json(&json!(2024)), Some(MetadataValue::Integer(2024)));
    }

    #[test]
    fn missing_metadata_defaults_to_empty() {
        let record: DocumentRecord = serde_json::from_value(json!({"content": "x"})).unwrap();
        assert!(record.metadata.is_empty());
    }
}
