use federator::core::{Slot, SourceId, SourceSet, TriplePattern};
use federator::parsing::QueryParser;
use federator::selection::SourceSelector;
use federator::statistics::{PredicateStats, StatisticsIndex};
use oxrdf::NamedNode;
use std::sync::Arc;

const KNOWS: &str = "http://example.org/knows";
const NAME: &str = "http://example.org/name";
const PERSON: &str = "http://example.org/Person";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// A advertises knows and Person, B advertises name and knows, C only name.
fn create_test_index() -> Arc<StatisticsIndex> {
    let (a, b, c) = (SourceId::new("A"), SourceId::new("B"), SourceId::new("C"));
    let mut index = StatisticsIndex::new();
    index.add_predicate(&a, NamedNode::new_unchecked(KNOWS), PredicateStats::new(100, 50, 80));
    index.add_predicate(&b, NamedNode::new_unchecked(KNOWS), PredicateStats::new(20, 10, 10));
    index.add_predicate(&b, NamedNode::new_unchecked(NAME), PredicateStats::new(40, 40, 38));
    index.add_predicate(&c, NamedNode::new_unchecked(NAME), PredicateStats::new(60, 60, 60));
    index.add_type(&a, NamedNode::new_unchecked(PERSON), 50);
    index.register_source(SourceId::new("D"));
    Arc::new(index)
}

fn sources(ids: &[&str]) -> SourceSet {
    ids.iter().map(|id| SourceId::new(*id)).collect()
}

#[test]
fn test_bound_predicate_maps_to_advertising_sources() {
    let selector = SourceSelector::new(create_test_index());
    let pattern = TriplePattern::new(Slot::var("x"), Slot::iri(KNOWS), Slot::var("y"));

    let mapped = selector.select(&pattern);
    assert_eq!(mapped.sources, sources(&["A", "B"]));
    assert!(!mapped.unselective);
    assert_eq!(mapped.cardinality, 120.0);
}

#[test]
fn test_unadvertised_predicate_maps_to_nothing() {
    let selector = SourceSelector::new(create_test_index());
    let pattern = TriplePattern::new(
        Slot::var("x"),
        Slot::iri("http://example.org/unknown"),
        Slot::var("y"),
    );

    let mapped = selector.select(&pattern);
    assert!(mapped.sources.is_empty());
    assert!(mapped.is_unsatisfiable());
    assert_eq!(mapped.cardinality, 0.0);
}

#[test]
fn test_unbound_predicate_maps_to_every_source() {
    let selector = SourceSelector::new(create_test_index());
    let pattern = TriplePattern::new(Slot::var("s"), Slot::var("p"), Slot::var("o"));

    let mapped = selector.select(&pattern);
    assert_eq!(mapped.sources, sources(&["A", "B", "C", "D"]));
    assert!(mapped.unselective);
}

#[test]
fn test_type_pattern_uses_class_partitions() {
    let selector = SourceSelector::new(create_test_index());
    let pattern = TriplePattern::new(Slot::var("x"), Slot::iri(RDF_TYPE), Slot::iri(PERSON));

    let mapped = selector.select(&pattern);
    assert_eq!(mapped.sources, sources(&["A"]));
    assert_eq!(mapped.cardinality, 50.0);
}

#[test]
fn test_bound_subject_reduces_cardinality() {
    let selector = SourceSelector::new(create_test_index());
    let open = TriplePattern::new(Slot::var("x"), Slot::iri(NAME), Slot::var("n"));
    let bound = TriplePattern::new(
        Slot::iri("http://example.org/alice"),
        Slot::iri(NAME),
        Slot::var("n"),
    );

    let open = selector.select(&open);
    let bound = selector.select(&bound);
    assert_eq!(open.sources, bound.sources);
    assert!(bound.cardinality < open.cardinality);
    // One name per subject in both sources.
    assert_eq!(bound.cardinality, 2.0);
}

#[test]
fn test_map_sources_preserves_order() {
    let selector = SourceSelector::new(create_test_index());
    let fragments = vec![
        TriplePattern::new(Slot::var("x"), Slot::iri(NAME), Slot::var("n")),
        TriplePattern::new(Slot::var("x"), Slot::iri(KNOWS), Slot::var("y")),
        TriplePattern::new(Slot::var("y"), Slot::iri(NAME), Slot::var("m")),
    ];

    let mapped = selector.map_sources(&fragments);
    assert_eq!(mapped.len(), 3);
    for (fragment, pattern) in mapped.iter().zip(&fragments) {
        assert_eq!(&fragment.pattern, pattern);
    }
    assert_eq!(mapped[0].sources, sources(&["B", "C"]));
    assert_eq!(mapped[1].sources, sources(&["A", "B"]));
    assert_eq!(mapped[2].sources, mapped[0].sources);
}

#[test]
fn test_exists_patterns_are_scoped() {
    let selector = SourceSelector::new(create_test_index());
    let query = format!(
        "SELECT ?x WHERE {{ ?x <{}> ?y FILTER EXISTS {{ ?y <{}> ?n }} }}",
        KNOWS, NAME
    );
    let parsed = QueryParser::new().parse(&query).unwrap();
    let filters = selector.scope_filters(&parsed.branches[0].filters);

    assert_eq!(filters[0].exists_patterns.len(), 1);
    assert_eq!(filters[0].exists_sources, vec![sources(&["B", "C"])]);
    assert!(!filters[0].exists_local_to(&sources(&["B"])));
    assert!(!filters[0].exists_local_to(&sources(&["B", "C"])));
}

#[test]
fn test_exists_within_one_source_is_local_to_it() {
    let selector = SourceSelector::new(create_test_index());
    let query = format!(
        "SELECT ?x WHERE {{ ?x a <{}> FILTER EXISTS {{ ?x a <{}> }} }}",
        PERSON, PERSON
    );
    let parsed = QueryParser::new().parse(&query).unwrap();
    let filters = selector.scope_filters(&parsed.branches[0].filters);

    assert!(filters[0].exists_local_to(&sources(&["A"])));
    assert!(!parsed.branches[0].filters[0].exists_local_to(&sources(&["A"])));
}
