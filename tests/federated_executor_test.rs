use async_trait::async_trait;
use federator::api::{Federation, QueryResponse};
use federator::core::{Binding, SourceId};
use federator::execution::{CancelSignal, ExecutionSettings, QueryInfo};
use federator::sources::{MemorySource, RowStream, Source, SourceRegistry};
use federator::statistics::{PredicateStats, StatisticsIndex};
use federator::{FederationError, SourceError};
use futures_util::stream::{self, StreamExt};
use oxrdf::{NamedNode, Term};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PEOPLE: &str = r#"
@prefix ex: <http://example.org/> .
ex:alice ex:knows ex:bob .
ex:bob ex:knows ex:carol .
"#;

const NAMES: &str = r#"
@prefix ex: <http://example.org/> .
ex:alice ex:name "Alice" .
ex:bob ex:name "Bob" .
ex:carol ex:name "Carol" .
"#;

const PREFIXES: &str = "PREFIX ex: <http://example.org/>\n";

fn iri(value: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/{}", value))
}

/// Answers after `delay` unless the query is cancelled first.
struct SlowSource {
    id: SourceId,
    delay: Duration,
    saw_cancel: Arc<AtomicBool>,
}

#[async_trait]
impl Source for SlowSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn select(&self, _query: &str, cancel: CancelSignal) -> RowStream {
        let delay = self.delay;
        let saw_cancel = Arc::clone(&self.saw_cancel);
        stream::once(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    Ok(Binding::new().with("x", iri("late")))
                }
                _ = cancel.cancelled() => {
                    saw_cancel.store(true, Ordering::SeqCst);
                    Err(SourceError::Cancelled)
                }
            }
        })
        .boxed()
    }

    async fn ask(&self, _query: &str, _cancel: CancelSignal) -> Result<bool, SourceError> {
        Ok(true)
    }
}

/// Fails every call.
struct BrokenSource {
    id: SourceId,
}

#[async_trait]
impl Source for BrokenSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn select(&self, _query: &str, _cancel: CancelSignal) -> RowStream {
        stream::iter(vec![Err(SourceError::Remote("HTTP 500".to_string()))]).boxed()
    }

    async fn ask(&self, _query: &str, _cancel: CancelSignal) -> Result<bool, SourceError> {
        Err(SourceError::Remote("HTTP 500".to_string()))
    }
}

struct Fixture {
    federation: Federation,
    people: Arc<MemorySource>,
    names: Arc<MemorySource>,
}

/// One in-memory source per `(id, turtle)` pair, with statistics computed from the data.
fn create_federation(
    data: &[(&str, &str)],
    settings: ExecutionSettings,
) -> (Federation, Vec<Arc<MemorySource>>) {
    let mut statistics = StatisticsIndex::new();
    let mut registry = SourceRegistry::new();
    let mut sources = Vec::new();
    for (id, turtle) in data {
        let source = Arc::new(MemorySource::from_turtle(SourceId::new(*id), turtle).unwrap());
        statistics.register_source(source.id().clone());
        statistics.add_descriptor(source.id(), &source.describe().unwrap()).unwrap();
        registry.register(Arc::clone(&source) as Arc<dyn Source>).unwrap();
        sources.push(source);
    }
    (Federation::new(Arc::new(statistics), registry, settings), sources)
}

fn create_fixture(settings: ExecutionSettings) -> Fixture {
    let (federation, mut sources) = create_federation(&[("A", PEOPLE), ("B", NAMES)], settings);
    let names = sources.pop().unwrap();
    let people = sources.pop().unwrap();
    Fixture { federation, people, names }
}

async fn planning_error(federation: &Federation, query: &str) -> FederationError {
    match federation.query(&format!("{}{}", PREFIXES, query)).await {
        Ok(_) => panic!("expected the query to be rejected"),
        Err(err) => err,
    }
}

async fn select(federation: &Federation, query: &str) -> (Vec<Binding>, Arc<QueryInfo>) {
    let response = federation.query(&format!("{}{}", PREFIXES, query)).await.unwrap();
    let QueryResponse::Solutions(mut rows) = response else {
        panic!("expected solutions");
    };
    let info = Arc::clone(rows.info());
    let mut collected = Vec::new();
    while let Some(row) = rows.next().await {
        collected.push(row.unwrap());
    }
    (collected, info)
}

#[tokio::test]
async fn test_join_across_sources() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, info) =
        select(&fixture.federation, "SELECT ?x ?n WHERE { ?x ex:knows ?y . ?y ex:name ?n }").await;

    let mut names: Vec<String> = rows
        .iter()
        .map(|row| match row.get("n") {
            Some(Term::Literal(literal)) => literal.value().to_string(),
            other => panic!("unexpected name {:?}", other),
        })
        .collect();
    names.sort();
    assert_eq!(names, vec!["Bob", "Carol"]);
    assert!(rows.iter().all(|row| row.len() == 2));

    assert!(info.failures().is_empty());
    assert!(!info.timed_out());
    // One sub-query for the left side, then one bound sub-query per distinct ?y.
    assert_eq!(fixture.people.requests(), 1);
    assert_eq!(fixture.names.requests(), 2);
    assert_eq!(info.remote_requests(), 3);
}

#[tokio::test]
async fn test_replicated_triples_are_unioned() {
    let shared = "@prefix ex: <http://example.org/> .\nex:alice ex:knows ex:bob .\n";
    let (federation, sources) =
        create_federation(&[("C", shared), ("D", shared)], ExecutionSettings::default());

    let (rows, info) = select(&federation, "SELECT ?y WHERE { ex:alice ex:knows ?y }").await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.get("y") == Some(&Term::from(iri("bob")))));
    assert_eq!(info.remote_requests(), 2);
    assert!(sources.iter().all(|source| source.requests() == 1));

    let (rows, _) =
        select(&federation, "SELECT DISTINCT ?y WHERE { ex:alice ex:knows ?y }").await;
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_exists_over_another_source_is_rejected() {
    let fixture = create_fixture(ExecutionSettings::default());
    let err = planning_error(
        &fixture.federation,
        "SELECT ?x WHERE { ?x ex:knows ?y FILTER EXISTS { ?y ex:name ?n } }",
    )
    .await;

    assert!(matches!(err, FederationError::UnsupportedFragment(_)));
    assert_eq!(fixture.people.requests() + fixture.names.requests(), 0);
}

#[tokio::test]
async fn test_exists_within_one_source_is_sent_along() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, _) = select(
        &fixture.federation,
        "SELECT ?x WHERE { ?x ex:knows ?y FILTER EXISTS { ?y ex:knows ?z } }",
    )
    .await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("x"), Some(&Term::from(iri("alice"))));
    assert_eq!(fixture.people.requests(), 1);
    assert_eq!(fixture.names.requests(), 0);
}

#[tokio::test]
async fn test_filter_spanning_sources_is_evaluated_locally() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, _) = select(
        &fixture.federation,
        r#"SELECT ?x ?n WHERE {
            ?x ex:knows ?y . ?y ex:name ?n
            FILTER(CONCAT(SUBSTR(STR(?x), 20), "-", UCASE(?n)) = "bob-CAROL")
        }"#,
    )
    .await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("x"), Some(&Term::from(iri("bob"))));
}

#[tokio::test]
async fn test_filter_spanning_sources_with_unknown_function_is_rejected() {
    let fixture = create_fixture(ExecutionSettings::default());
    let err = planning_error(
        &fixture.federation,
        "SELECT ?x WHERE { ?x ex:knows ?y . ?y ex:name ?n FILTER(MD5(STR(?x)) = ?n) }",
    )
    .await;

    assert!(matches!(err, FederationError::UnsupportedFragment(_)));
    assert_eq!(fixture.people.requests() + fixture.names.requests(), 0);
}

#[tokio::test]
async fn test_empty_left_side_skips_right_side() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, info) = select(
        &fixture.federation,
        "SELECT * WHERE { ?x ex:knows ex:nobody . ?x ex:name ?n }",
    )
    .await;

    assert!(rows.is_empty());
    assert_eq!(fixture.people.requests(), 1);
    assert_eq!(fixture.names.requests(), 0);
    assert_eq!(info.remote_requests(), 1);
}

#[tokio::test]
async fn test_unknown_predicate_sends_nothing() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, info) =
        select(&fixture.federation, "SELECT * WHERE { ?x ex:knows ?y . ?y ex:age ?a }").await;

    assert!(rows.is_empty());
    assert_eq!(info.remote_requests(), 0);
    assert_eq!(fixture.people.requests() + fixture.names.requests(), 0);
}

#[tokio::test]
async fn test_probes_prune_empty_sources() {
    let settings = ExecutionSettings { probe_threshold: 0.0, ..ExecutionSettings::default() };
    let fixture = create_fixture(settings);
    let (rows, info) = select(&fixture.federation, r#"SELECT ?s WHERE { ?s ?p "Bob" }"#).await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("s"), Some(&Term::from(iri("bob"))));
    assert_eq!(info.probe_queries(), 2);
    assert_eq!(info.remote_requests(), 1);
    // The people source only answered its probe.
    assert_eq!(fixture.people.requests(), 1);
    assert_eq!(fixture.names.requests(), 2);
}

#[tokio::test]
async fn test_distinct_and_limit() {
    let fixture = create_fixture(ExecutionSettings::default());

    let (rows, _) = select(&fixture.federation, "SELECT DISTINCT ?p WHERE { ?s ?p ?o }").await;
    assert_eq!(rows.len(), 2);

    let query = "SELECT * WHERE { ?x ex:knows ?y . ?y ex:name ?n } LIMIT 1";
    let (rows, _) = select(&fixture.federation, query).await;
    assert_eq!(rows.len(), 1);

    let (rows, _) = select(&fixture.federation, "SELECT ?n WHERE { ?x ex:name ?n } OFFSET 1").await;
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_filter_sent_with_bound_subquery() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, _) = select(
        &fixture.federation,
        r#"SELECT ?x WHERE {
            ?x ex:knows ?y . ?y ex:name ?n . ?x ex:name ?m
            FILTER(?n != "Bob")
        }"#,
    )
    .await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("x"), Some(&Term::from(iri("bob"))));
}

#[tokio::test]
async fn test_union_of_branches() {
    let fixture = create_fixture(ExecutionSettings::default());
    let (rows, _) = select(
        &fixture.federation,
        "SELECT ?x WHERE { { ?x ex:knows ex:bob } UNION { ?x ex:name \"Carol\" } }",
    )
    .await;

    let mut subjects: Vec<String> =
        rows.iter().filter_map(|r| r.get("x")).map(ToString::to_string).collect();
    subjects.sort();
    assert_eq!(subjects, vec!["<http://example.org/alice>", "<http://example.org/carol>"]);
}

#[tokio::test]
async fn test_ask_query() {
    let fixture = create_fixture(ExecutionSettings::default());
    let yes = format!("{}ASK {{ ex:alice ex:knows ?y . ?y ex:name \"Bob\" }}", PREFIXES);
    let no = format!("{}ASK {{ ex:carol ex:knows ?y }}", PREFIXES);

    match fixture.federation.query(&yes).await.unwrap() {
        QueryResponse::Boolean { value, .. } => assert!(value),
        other => panic!("expected a boolean, got {:?}", other),
    }
    match fixture.federation.query(&no).await.unwrap() {
        QueryResponse::Boolean { value, .. } => assert!(!value),
        other => panic!("expected a boolean, got {:?}", other),
    }
}

/// A federation of one slow source advertising `ex:p`.
fn slow_federation(timeout: Duration, saw_cancel: &Arc<AtomicBool>) -> Federation {
    let slow = SlowSource {
        id: SourceId::new("slow"),
        delay: Duration::from_secs(30),
        saw_cancel: Arc::clone(saw_cancel),
    };
    let mut statistics = StatisticsIndex::new();
    statistics.add_predicate(&slow.id, iri("p"), PredicateStats::new(10, 10, 10));
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(slow)).unwrap();

    let settings = ExecutionSettings { timeout: Some(timeout), ..ExecutionSettings::default() };
    Federation::new(Arc::new(statistics), registry, settings)
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..100 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_deadline_yields_timeout_error() {
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let federation = slow_federation(Duration::from_millis(1), &saw_cancel);

    let query = format!("{}SELECT * WHERE {{ ?x ex:p ?y }}", PREFIXES);
    let QueryResponse::Solutions(mut rows) = federation.query(&query).await.unwrap() else {
        panic!("expected solutions");
    };

    let last = tokio::time::timeout(Duration::from_secs(5), rows.next()).await.unwrap();
    assert!(matches!(last, Some(Err(FederationError::Timeout { .. }))));
    assert!(rows.next().await.is_none());
    assert!(rows.info().timed_out());
}

#[tokio::test]
async fn test_timeout_cancels_outstanding_calls() {
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let federation = slow_federation(Duration::from_millis(100), &saw_cancel);

    let query = format!("{}SELECT * WHERE {{ ?x ex:p ?y }}", PREFIXES);
    let QueryResponse::Solutions(mut rows) = federation.query(&query).await.unwrap() else {
        panic!("expected solutions");
    };

    let last = tokio::time::timeout(Duration::from_secs(5), rows.next()).await.unwrap();
    assert!(matches!(last, Some(Err(FederationError::Timeout { .. }))));
    // The source sees the cancel signal from its own task.
    assert!(wait_for(&saw_cancel).await);
    assert_eq!(rows.info().remote_requests(), 1);
}

#[tokio::test]
async fn test_failing_source_is_reported() {
    let names = Arc::new(MemorySource::from_turtle(SourceId::new("B"), NAMES).unwrap());
    let broken = BrokenSource { id: SourceId::new("broken") };

    let mut statistics = StatisticsIndex::new();
    statistics.add_descriptor(names.id(), &names.describe().unwrap()).unwrap();
    statistics.add_predicate(&broken.id, iri("name"), PredicateStats::new(5, 5, 5));
    let mut registry = SourceRegistry::new();
    registry.register(Arc::clone(&names) as Arc<dyn Source>).unwrap();
    registry.register(Arc::new(broken)).unwrap();

    let federation = Federation::new(Arc::new(statistics), registry, ExecutionSettings::default());
    let (rows, info) = select(&federation, "SELECT ?n WHERE { ?x ex:name ?n }").await;

    assert_eq!(rows.len(), 3);
    let failures = info.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source, SourceId::new("broken"));
    assert!(failures[0].message.contains("HTTP 500"));
    assert_eq!(info.remote_requests(), 2);
}

#[tokio::test]
async fn test_dropping_stream_cancels_query() {
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let federation = slow_federation(Duration::from_secs(60), &saw_cancel);

    let response = federation
        .query(&format!("{}SELECT * WHERE {{ ?x ex:p ?y }}", PREFIXES))
        .await
        .unwrap();
    let info = Arc::clone(response.info());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!saw_cancel.load(Ordering::SeqCst));
    drop(response);

    assert!(wait_for(&saw_cancel).await);
    assert!(!info.timed_out());
}
