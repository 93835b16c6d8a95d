use federator::api::{Federation, QueryResponse};
use federator::config::FederationConfig;
use federator::core::SourceId;
use federator::FederationError;
use futures_util::TryStreamExt;
use std::path::Path;

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

const JOIN: &str = r#"
PREFIX ex: <http://example.org/>
SELECT ?x ?n WHERE { ?x ex:knows ?y . ?y ex:name ?n }"#;

fn write_federation(dir: &Path, extra_sources: &str) -> FederationConfig {
    std::fs::write(dir.join("people.ttl"), PEOPLE).unwrap();
    std::fs::write(dir.join("names.ttl"), NAMES).unwrap();
    let path = dir.join("federation.json");
    std::fs::write(
        &path,
        format!(
            r#"{{
                "sources": [
                    {{ "id": "people", "kind": "memory", "data": "people.ttl" }},
                    {{ "id": "names", "kind": "memory", "data": "names.ttl" }}
                    {}
                ],
                "timeout_ms": 10000
            }}"#,
            extra_sources
        ),
    )
    .unwrap();
    FederationConfig::from_file(&path).unwrap()
}

#[tokio::test]
async fn test_query_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let federation = Federation::from_config(&write_federation(dir.path(), "")).await.unwrap();
    assert_eq!(federation.registry().len(), 2);

    let QueryResponse::Solutions(rows) = federation.query(JOIN).await.unwrap() else {
        panic!("expected solutions");
    };
    assert_eq!(rows.variables(), ["x".to_string(), "n".to_string()]);
    let info = rows.info().clone();
    let rows: Vec<_> = rows.try_collect().await.unwrap();
    assert_eq!(rows.len(), 2);

    let snapshot = info.snapshot();
    assert_eq!(snapshot.remote_requests, 3);
    assert!(!snapshot.timed_out);
    assert!(snapshot.failures.is_empty());
    federation.close().await;
}

#[tokio::test]
async fn test_explain_and_source_report() {
    let dir = tempfile::tempdir().unwrap();
    let federation = Federation::from_config(&write_federation(dir.path(), "")).await.unwrap();

    let explained = federation.explain(JOIN).unwrap();
    assert!(explained.starts_with("Join on ?y"));
    assert!(explained.contains("Leaf @ [people]"));
    assert!(explained.contains("Leaf @ [names]"));

    let reports: Vec<String> =
        federation.select_sources(JOIN).unwrap().iter().map(ToString::to_string).collect();
    assert_eq!(
        reports,
        vec![
            "[?x <http://example.org/knows> ?y];1;[people]",
            "[?y <http://example.org/name> ?n];1;[names]",
        ]
    );
}

#[tokio::test]
async fn test_ask_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let federation = Federation::from_config(&write_federation(dir.path(), "")).await.unwrap();

    let response = federation
        .query("ASK { <http://example.org/alice> <http://example.org/name> \"Alice\" }")
        .await
        .unwrap();
    match response {
        QueryResponse::Boolean { value, info } => {
            assert!(value);
            assert_eq!(info.remote_requests(), 1);
        }
        other => panic!("expected a boolean, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_gives_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("remote.json"),
        r#"{ "property_partitions": [
            { "property": "http://example.org/name", "triples": 10,
              "distinct_subjects": 10, "distinct_objects": 10 }
        ] }"#,
    )
    .unwrap();
    let remote = r#", { "id": "remote", "endpoint": "http://127.0.0.1:9/sparql",
                        "statistics": "remote.json" }"#;
    let federation = Federation::from_config(&write_federation(dir.path(), remote)).await.unwrap();

    let QueryResponse::Solutions(rows) = federation.query(JOIN).await.unwrap() else {
        panic!("expected solutions");
    };
    let info = rows.info().clone();
    let rows: Vec<_> = rows.try_collect().await.unwrap();
    assert_eq!(rows.len(), 2);

    let failures = info.failures();
    assert!(!failures.is_empty());
    assert!(failures.iter().all(|f| f.source == SourceId::new("remote")));
}

#[tokio::test]
async fn test_missing_data_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("federation.json");
    std::fs::write(&path, r#"{ "sources": [{ "id": "A", "kind": "memory", "data": "gone.ttl" }] }"#)
        .unwrap();

    let config = FederationConfig::from_file(&path).unwrap();
    let err = Federation::from_config(&config).await.unwrap_err();
    assert!(matches!(err, FederationError::Config(_)));
}

#[tokio::test]
async fn test_syntax_error_reported_before_execution() {
    let dir = tempfile::tempdir().unwrap();
    let federation = Federation::from_config(&write_federation(dir.path(), "")).await.unwrap();

    let err = federation.query("SELECT ?x WHERE { ?x").await.unwrap_err();
    assert!(matches!(err, FederationError::Parse(_)));
}
