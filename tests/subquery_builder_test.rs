use federator::core::{Binding, SourceId};
use federator::optimizer::{Group, QueryOptimizer};
use federator::parsing::{FilterCondition, QueryForm, QueryParser};
use federator::selection::SourceSelector;
use federator::statistics::{PredicateStats, StatisticsIndex};
use federator::subquery::SubQueryBuilder;
use federator::FederationError;
use oxrdf::NamedNode;
use std::sync::Arc;

const QUERY: &str = r#"
PREFIX ex: <http://example.org/>
SELECT ?x ?n WHERE {
    ?x ex:knows ?y .
    ?y ex:name ?n .
    ?y ex:age ?age .
    FILTER(?age >= 18 && CONTAINS(LCASE(?n), "bo"))
}"#;

/// A single source advertising every predicate, so the query becomes one group.
fn single_group(query: &str) -> Group {
    let a = SourceId::new("A");
    let mut index = StatisticsIndex::new();
    for predicate in ["knows", "name", "age"] {
        index.add_predicate(
            &a,
            NamedNode::new_unchecked(format!("http://example.org/{}", predicate)),
            PredicateStats::new(10, 10, 10),
        );
    }
    let selector = SourceSelector::new(Arc::new(index));
    let optimizer = QueryOptimizer::new();

    let query = QueryParser::new().parse(query).unwrap();
    let plan = optimizer
        .optimize(&selector.map_sources(&query.branches[0].fragments), &query.branches[0].filters)
        .unwrap();
    let leaves = plan.leaves();
    assert_eq!(leaves.len(), 1);
    leaves[0].clone()
}

#[test]
fn test_rendered_group_parses_back_to_same_fragments() {
    let group = single_group(QUERY);
    assert_eq!(group.filters.len(), 1);

    let text = SubQueryBuilder::new().render(&group).unwrap();
    let reparsed = QueryParser::new().parse(&text).unwrap();

    assert_eq!(reparsed.form, QueryForm::Select);
    assert_eq!(reparsed.branches.len(), 1);
    let branch = &reparsed.branches[0];
    assert_eq!(branch.fragments, group.patterns().cloned().collect::<Vec<_>>());
    assert_eq!(branch.filters, group.filters);
    assert_eq!(reparsed.result_variables(), vec!["x", "y", "n", "age"]);
}

#[test]
fn test_bound_render_parses_back_with_constants() {
    let group = single_group(QUERY);
    let bob = NamedNode::new_unchecked("http://example.org/bob");
    let binding = Binding::new().with("y", bob.clone());

    let text = SubQueryBuilder::new().render_bound(&group, &binding).unwrap();
    let reparsed = QueryParser::new().parse(&text).unwrap();

    let branch = &reparsed.branches[0];
    assert_eq!(branch.fragments.len(), 3);
    assert!(branch.fragments.iter().all(|f| !f.variables().contains("y")));
    assert_eq!(branch.fragments[1].subject.as_named_node(), Some(&bob));
    assert_eq!(reparsed.result_variables(), vec!["x", "n", "age"]);
}

#[test]
fn test_ask_probe_parses_as_ask() {
    let group = single_group(QUERY);
    let text = SubQueryBuilder::new().render_ask(&group).unwrap();
    let reparsed = QueryParser::new().parse(&text).unwrap();
    assert_eq!(reparsed.form, QueryForm::Ask);
    assert_eq!(reparsed.branches[0].fragments.len(), 3);
}

#[test]
fn test_unrenderable_filter_fails_before_dispatch() {
    let mut group = single_group(QUERY);
    let query = QueryParser::new()
        .parse(
            r#"SELECT * WHERE {
                ?y <http://example.org/name> ?n
                FILTER(REGEX(SUBSTR(?n, 1, 2), "^bo"))
            }"#,
        )
        .unwrap();
    let filter: FilterCondition = query.branches[0].filters[0].clone();
    group.filters.push(filter);

    let builder = SubQueryBuilder::new();
    for result in [builder.render(&group), builder.render_ask(&group)] {
        assert!(matches!(result, Err(FederationError::UnsupportedFragment(_))));
    }
}
