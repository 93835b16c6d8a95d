//! Per-source statistics descriptors as read from disk.

use serde::{Deserialize, Serialize};

/// Triple count and distinct subject/object counts of one property partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateStats {
    pub triples: u64,
    #[serde(default)]
    pub distinct_subjects: u64,
    #[serde(default)]
    pub distinct_objects: u64,
}

impl PredicateStats {
    pub fn new(triples: u64, distinct_subjects: u64, distinct_objects: u64) -> Self {
        Self { triples, distinct_subjects, distinct_objects }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPartition {
    pub property: String,
    #[serde(flatten)]
    pub stats: PredicateStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPartition {
    pub class: String,
    pub entities: u64,
}

/// Dataset-level statistics of one source.
///
/// Totals are optional in the document; missing ones are derived from the
/// partitions when the descriptor is added to an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triples: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<u64>,
    #[serde(default)]
    pub property_partitions: Vec<PropertyPartition>,
    #[serde(default)]
    pub class_partitions: Vec<ClassPartition>,
}

impl SourceDescriptor {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::FederationError::Statistics(e.to_string()))
    }

    pub fn with_property(mut self, property: &str, stats: PredicateStats) -> Self {
        self.property_partitions.push(PropertyPartition { property: property.to_string(), stats });
        self
    }

    pub fn with_class(mut self, class: &str, entities: u64) -> Self {
        self.class_partitions.push(ClassPartition { class: class.to_string(), entities });
        self
    }
}
