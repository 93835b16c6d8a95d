//! Groups fragments that can be answered by the same remote call.

use crate::core::{SourceSet, TriplePattern};
use crate::parsing::FilterCondition;
use crate::selection::MappedFragment;
use std::collections::BTreeSet;

/// Fragments sharing one exact candidate source set, in original order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub sources: SourceSet,
    pub fragments: Vec<MappedFragment>,
    /// Filters rendered into this group's sub-query.
    pub filters: Vec<FilterCondition>,
    /// Position of the group in first-occurrence order.
    pub position: usize,
}

impl Group {
    pub fn patterns(&self) -> impl Iterator<Item = &TriplePattern> {
        self.fragments.iter().map(|f| &f.pattern)
    }

    pub fn variables(&self) -> BTreeSet<String> {
        self.fragments.iter().flat_map(|f| f.pattern.variables()).collect()
    }

    /// Named variables in first-occurrence order, used for projections.
    pub fn variables_in_order(&self) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::new();
        for pattern in self.patterns() {
            for variable in pattern.variables_in_order() {
                if !ordered.contains(&variable) {
                    ordered.push(variable);
                }
            }
        }
        ordered
    }

    /// Whether any fragment had to be sent to every source.
    pub fn is_unselective(&self) -> bool {
        self.fragments.iter().any(|f| f.unselective)
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Partitions fragments by exact equality of their source sets.
pub fn group_fragments(mapped: &[MappedFragment]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for fragment in mapped {
        match groups.iter_mut().find(|g| g.sources == fragment.sources) {
            Some(group) => group.fragments.push(fragment.clone()),
            None => {
                let position = groups.len();
                groups.push(Group {
                    sources: fragment.sources.clone(),
                    fragments: vec![fragment.clone()],
                    filters: Vec::new(),
                    position,
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Slot, SourceId};
    use std::collections::BTreeMap;

    fn fragment(predicate: &str, sources: &[&str]) -> MappedFragment {
        MappedFragment {
            pattern: TriplePattern::new(Slot::var("s"), Slot::iri(predicate), Slot::var("o")),
            sources: sources.iter().map(|s| SourceId::new(*s)).collect(),
            cardinality: 10.0,
            unselective: false,
            distinct: BTreeMap::new(),
        }
    }

    #[test]
    fn test_grouping_is_a_partition() {
        let mapped = vec![
            fragment("http://ex/p1", &["A"]),
            fragment("http://ex/p2", &["A", "B"]),
            fragment("http://ex/p3", &["A"]),
            fragment("http://ex/p4", &["B", "A"]),
            fragment("http://ex/p5", &["B"]),
        ];
        let groups = group_fragments(&mapped);

        assert_eq!(groups.len(), 3);
        let total: usize = groups.iter().map(|g| g.fragments.len()).sum();
        assert_eq!(total, mapped.len());
        for group in &groups {
            assert!(group.fragments.iter().all(|f| f.sources == group.sources));
        }
        assert_eq!(groups[0].fragments[1].pattern, mapped[2].pattern);
        assert_eq!(groups[1].fragments.len(), 2);
        assert_eq!(groups[2].position, 2);
    }

    #[test]
    fn test_no_subset_merging() {
        let mapped = [fragment("http://ex/p", &["A"]), fragment("http://ex/q", &["A", "B"])];
        let groups = group_fragments(&mapped);
        assert_eq!(groups.len(), 2);
    }
}
