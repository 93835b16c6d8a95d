//! Statistics-driven source selection.

use crate::core::{Slot, SourceId, SourceSet, TriplePattern};
use crate::parsing::FilterCondition;
use crate::statistics::{PredicateStats, StatisticsIndex};
use oxrdf::vocab::rdf;
use oxrdf::{NamedNode, Term};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A triple pattern annotated with its candidate sources and estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFragment {
    pub pattern: TriplePattern,
    /// Sources that may hold matching triples. Empty means unsatisfiable.
    pub sources: SourceSet,
    /// Estimated number of matches, summed over all candidate sources.
    pub cardinality: f64,
    /// Set when the predicate was unbound and every source had to be kept.
    pub unselective: bool,
    /// Estimated number of distinct values per named variable.
    pub distinct: BTreeMap<String, f64>,
}

impl MappedFragment {
    pub fn is_unsatisfiable(&self) -> bool {
        self.sources.is_empty()
    }

    /// Distinct value estimate for `variable`, falling back to the cardinality.
    pub fn distinct_values(&self, variable: &str) -> f64 {
        self.distinct.get(variable).copied().unwrap_or(self.cardinality)
    }
}

impl fmt::Display for MappedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.sources.iter().map(SourceId::as_str).collect();
        write!(f, "{} @ [{}] ~{:.1}", self.pattern, sources.join(", "), self.cardinality)
    }
}

/// Partition lookups for one predicate or type, shared across the fragments
/// of a single `map_sources` call.
#[derive(Debug, Clone)]
enum Lookup {
    Predicate(BTreeMap<SourceId, PredicateStats>),
    Type(BTreeMap<SourceId, u64>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LookupKey {
    Predicate(NamedNode),
    Type(NamedNode),
}

/// Maps fragments to candidate sources. Never touches the network.
pub struct SourceSelector {
    statistics: Arc<StatisticsIndex>,
}

impl SourceSelector {
    pub fn new(statistics: Arc<StatisticsIndex>) -> Self {
        Self { statistics }
    }

    pub fn statistics(&self) -> &Arc<StatisticsIndex> {
        &self.statistics
    }

    /// Maps every fragment, preserving input order.
    pub fn map_sources(&self, fragments: &[TriplePattern]) -> Vec<MappedFragment> {
        let mut cache = HashMap::new();
        fragments.iter().map(|pattern| self.map_with(pattern, &mut cache)).collect()
    }

    /// Resolves the candidate sources of the patterns inside each filter's
    /// `EXISTS` clauses, so the planner can tell where the filter may be sent.
    pub fn scope_filters(&self, filters: &[FilterCondition]) -> Vec<FilterCondition> {
        filters
            .iter()
            .map(|filter| {
                let mut filter = filter.clone();
                filter.exists_sources = self
                    .map_sources(&filter.exists_patterns)
                    .into_iter()
                    .map(|mapped| mapped.sources)
                    .collect();
                filter
            })
            .collect()
    }

    /// Maps a single fragment.
    pub fn select(&self, pattern: &TriplePattern) -> MappedFragment {
        self.map_with(pattern, &mut HashMap::new())
    }

    fn map_with(
        &self,
        pattern: &TriplePattern,
        cache: &mut HashMap<LookupKey, Lookup>,
    ) -> MappedFragment {
        let key = match (&pattern.predicate, &pattern.object) {
            (Slot::Term(Term::NamedNode(p)), Slot::Term(Term::NamedNode(class)))
                if p.as_ref() == rdf::TYPE =>
            {
                Some(LookupKey::Type(class.clone()))
            }
            (Slot::Term(Term::NamedNode(p)), _) => Some(LookupKey::Predicate(p.clone())),
            _ => None,
        };

        let mapped = match key {
            Some(key) => {
                let lookup = cache.entry(key.clone()).or_insert_with(|| self.lookup(&key));
                match lookup {
                    Lookup::Predicate(stats) => map_predicate(pattern, stats),
                    Lookup::Type(entities) => map_type(pattern, entities),
                }
            }
            None => self.map_unbound(pattern),
        };

        debug!("Mapped {}", mapped);
        mapped
    }

    fn lookup(&self, key: &LookupKey) -> Lookup {
        match key {
            LookupKey::Predicate(p) => {
                Lookup::Predicate(self.statistics.predicate_sources(p).cloned().unwrap_or_default())
            }
            LookupKey::Type(class) => {
                Lookup::Type(self.statistics.type_sources(class).cloned().unwrap_or_default())
            }
        }
    }

    fn map_unbound(&self, pattern: &TriplePattern) -> MappedFragment {
        let sources: SourceSet = self.statistics.sources().cloned().collect();
        let cardinality = self.statistics.federation_triples() as f64;
        let distinct = pattern.variables().into_iter().map(|v| (v, cardinality)).collect();
        let pattern = pattern.clone();
        MappedFragment { pattern, sources, cardinality, unselective: true, distinct }
    }
}

fn map_predicate(
    pattern: &TriplePattern,
    partitions: &BTreeMap<SourceId, PredicateStats>,
) -> MappedFragment {
    let subject_bound = pattern.subject.is_bound();
    let object_bound = pattern.object.is_bound();

    let mut cardinality = 0.0;
    let mut subjects = 0.0;
    let mut objects = 0.0;
    for stats in partitions.values() {
        let mut estimate = stats.triples as f64;
        if subject_bound {
            estimate /= stats.distinct_subjects.max(1) as f64;
        }
        if object_bound {
            estimate /= stats.distinct_objects.max(1) as f64;
        }
        cardinality += estimate;
        subjects += nonzero_or(stats.distinct_subjects, stats.triples);
        objects += nonzero_or(stats.distinct_objects, stats.triples);
    }

    let mut distinct = BTreeMap::new();
    if let Slot::Var(v) = &pattern.subject {
        distinct.insert(v.clone(), subjects.min(cardinality));
    }
    if let Slot::Var(v) = &pattern.object {
        let estimate = objects.min(cardinality);
        distinct
            .entry(v.clone())
            .and_modify(|d: &mut f64| *d = d.min(estimate))
            .or_insert(estimate);
    }

    MappedFragment {
        pattern: pattern.clone(),
        sources: partitions.keys().cloned().collect(),
        cardinality,
        unselective: false,
        distinct,
    }
}

fn map_type(pattern: &TriplePattern, partitions: &BTreeMap<SourceId, u64>) -> MappedFragment {
    let cardinality: f64 = partitions
        .values()
        .map(|&entities| {
            if pattern.subject.is_bound() {
                entities.min(1) as f64
            } else {
                entities as f64
            }
        })
        .sum();

    let mut distinct = BTreeMap::new();
    if let Slot::Var(v) = &pattern.subject {
        distinct.insert(v.clone(), cardinality);
    }

    MappedFragment {
        pattern: pattern.clone(),
        sources: partitions.keys().cloned().collect(),
        cardinality,
        unselective: false,
        distinct,
    }
}

fn nonzero_or(value: u64, fallback: u64) -> f64 {
    if value == 0 { fallback as f64 } else { value as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Arc<StatisticsIndex> {
        let mut index = StatisticsIndex::new();
        let a = SourceId::new("A");
        let b = SourceId::new("B");
        let knows = NamedNode::new_unchecked("http://ex/knows");
        let name = NamedNode::new_unchecked("http://ex/name");
        index.add_predicate(&a, knows, PredicateStats::new(100, 50, 80));
        index.add_predicate(&b, name, PredicateStats::new(40, 40, 35));
        index.add_type(&b, NamedNode::new_unchecked("http://ex/Person"), 40);
        Arc::new(index)
    }

    #[test]
    fn test_bound_subject_divides_by_distinct_subjects() {
        let selector = SourceSelector::new(index());
        let pattern = TriplePattern::new(
            Slot::iri("http://ex/alice"),
            Slot::iri("http://ex/knows"),
            Slot::var("y"),
        );
        let mapped = selector.select(&pattern);
        assert!((mapped.cardinality - 2.0).abs() < f64::EPSILON);
        assert!(mapped.distinct_values("y") <= mapped.cardinality);
    }

    #[test]
    fn test_type_pattern_uses_class_partitions() {
        let selector = SourceSelector::new(index());
        let pattern = TriplePattern::new(
            Slot::var("x"),
            Slot::Term(rdf::TYPE.into_owned().into()),
            Slot::iri("http://ex/Person"),
        );
        let mapped = selector.select(&pattern);
        assert_eq!(mapped.sources.len(), 1);
        assert!(mapped.sources.contains(&SourceId::new("B")));
        assert!((mapped.cardinality - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_repeated_predicate_reuses_lookup() {
        let selector = SourceSelector::new(index());
        let knows = |s: &str, o: &str| {
            TriplePattern::new(Slot::var(s), Slot::iri("http://ex/knows"), Slot::var(o))
        };
        let mapped = selector.map_sources(&[knows("a", "b"), knows("b", "c")]);
        assert_eq!(mapped[0].sources, mapped[1].sources);
        assert_eq!(mapped[0].cardinality, mapped[1].cardinality);
    }
}
