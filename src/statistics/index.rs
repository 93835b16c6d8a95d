//! Read-only statistics index consulted by source selection and costing.

use super::descriptor::{PredicateStats, SourceDescriptor};
use crate::core::SourceId;
use crate::error::{FederationError, Result};
use oxrdf::NamedNode;
use std::collections::{BTreeMap, HashMap};

/// Dataset totals of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceTotals {
    pub triples: u64,
    pub properties: u64,
    pub classes: u64,
    pub entities: u64,
}

/// Maps predicates and types to the sources that advertise them.
///
/// Built once when the federation starts and shared through an `Arc`
/// afterwards; nothing mutates it while queries run.
#[derive(Debug, Clone, Default)]
pub struct StatisticsIndex {
    by_predicate: HashMap<NamedNode, BTreeMap<SourceId, PredicateStats>>,
    by_type: HashMap<NamedNode, BTreeMap<SourceId, u64>>,
    totals: BTreeMap<SourceId, SourceTotals>,
}

impl StatisticsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a source known without advertising anything for it.
    pub fn register_source(&mut self, source: SourceId) {
        self.totals.entry(source).or_default();
    }

    pub fn add_predicate(
        &mut self,
        source: &SourceId,
        predicate: NamedNode,
        stats: PredicateStats,
    ) {
        self.register_source(source.clone());
        self.by_predicate.entry(predicate).or_default().insert(source.clone(), stats);
    }

    pub fn add_type(&mut self, source: &SourceId, class: NamedNode, entities: u64) {
        self.register_source(source.clone());
        self.by_type.entry(class).or_default().insert(source.clone(), entities);
    }

    pub fn set_totals(&mut self, source: &SourceId, totals: SourceTotals) {
        self.totals.insert(source.clone(), totals);
    }

    /// Adds every partition of `descriptor` under `source`. Totals missing
    /// from the descriptor are summed from its partitions.
    pub fn add_descriptor(
        &mut self,
        source: &SourceId,
        descriptor: &SourceDescriptor,
    ) -> Result<()> {
        self.register_source(source.clone());

        let mut partition_triples = 0u64;
        for partition in &descriptor.property_partitions {
            let predicate = parse_iri(&partition.property, source)?;
            partition_triples = partition_triples.saturating_add(partition.stats.triples);
            self.add_predicate(source, predicate, partition.stats);
        }

        let mut partition_entities = 0u64;
        for partition in &descriptor.class_partitions {
            let class = parse_iri(&partition.class, source)?;
            partition_entities = partition_entities.saturating_add(partition.entities);
            self.add_type(source, class, partition.entities);
        }

        let totals = SourceTotals {
            triples: descriptor.triples.unwrap_or(partition_triples),
            properties: descriptor
                .properties
                .unwrap_or(descriptor.property_partitions.len() as u64),
            classes: descriptor.classes.unwrap_or(descriptor.class_partitions.len() as u64),
            entities: descriptor.entities.unwrap_or(partition_entities),
        };
        self.set_totals(source, totals);
        Ok(())
    }

    /// All known sources in identifier order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceId> {
        self.totals.keys()
    }

    pub fn source_count(&self) -> usize {
        self.totals.len()
    }

    pub fn contains_source(&self, source: &SourceId) -> bool {
        self.totals.contains_key(source)
    }

    /// Sources advertising `predicate` with their partition statistics.
    pub fn predicate_sources(
        &self,
        predicate: &NamedNode,
    ) -> Option<&BTreeMap<SourceId, PredicateStats>> {
        self.by_predicate.get(predicate)
    }

    /// Sources advertising instances of `class` with their entity counts.
    pub fn type_sources(&self, class: &NamedNode) -> Option<&BTreeMap<SourceId, u64>> {
        self.by_type.get(class)
    }

    pub fn totals(&self, source: &SourceId) -> Option<&SourceTotals> {
        self.totals.get(source)
    }

    pub fn total_triples(&self, source: &SourceId) -> u64 {
        self.totals.get(source).map_or(0, |t| t.triples)
    }

    /// Sum of total triples over all sources.
    pub fn federation_triples(&self) -> u64 {
        self.totals.values().map(|t| t.triples).fold(0, u64::saturating_add)
    }

    pub fn predicate_count(&self) -> usize {
        self.by_predicate.len()
    }

    pub fn type_count(&self) -> usize {
        self.by_type.len()
    }
}

fn parse_iri(value: &str, source: &SourceId) -> Result<NamedNode> {
    NamedNode::new(value).map_err(|e| {
        FederationError::Statistics(format!(
            "Invalid IRI '{}' in statistics of {}: {}",
            value, source, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(value: &str) -> NamedNode {
        NamedNode::new_unchecked(value)
    }

    #[test]
    fn test_descriptor_totals_fall_back_to_partitions() {
        let descriptor = SourceDescriptor::default()
            .with_property("http://ex/knows", PredicateStats::new(100, 50, 80))
            .with_property("http://ex/name", PredicateStats::new(20, 20, 20))
            .with_class("http://ex/Person", 50);

        let mut index = StatisticsIndex::new();
        let source = SourceId::new("A");
        index.add_descriptor(&source, &descriptor).unwrap();

        let totals = index.totals(&source).unwrap();
        assert_eq!(totals.triples, 120);
        assert_eq!(totals.properties, 2);
        assert_eq!(totals.classes, 1);
        assert_eq!(totals.entities, 50);
        assert_eq!(index.predicate_sources(&iri("http://ex/knows")).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_iri_rejected() {
        let descriptor =
            SourceDescriptor::default().with_property("not an iri", PredicateStats::default());
        let mut index = StatisticsIndex::new();
        let err = index.add_descriptor(&SourceId::new("A"), &descriptor).unwrap_err();
        assert!(matches!(err, FederationError::Statistics(_)));
    }

    #[test]
    fn test_registered_source_advertises_nothing() {
        let mut index = StatisticsIndex::new();
        index.register_source(SourceId::new("empty"));
        assert_eq!(index.source_count(), 1);
        assert_eq!(index.total_triples(&SourceId::new("empty")), 0);
        assert!(index.predicate_sources(&iri("http://ex/p")).is_none());
    }
}
