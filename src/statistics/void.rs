//! Reads VoID statistics documents (Turtle or N-Triples) into descriptors.
//!
//! The document is loaded into an in-memory oxigraph store and the dataset
//! description is extracted with SPARQL, so any serialization oxigraph can
//! parse works as long as it uses the `http://rdfs.org/ns/void#` vocabulary.

use super::descriptor::{ClassPartition, PredicateStats, PropertyPartition, SourceDescriptor};
use crate::error::{FederationError, Result};
use oxigraph::io::GraphFormat;
use oxigraph::model::{GraphNameRef, Term};
use oxigraph::sparql::{QueryResults, QuerySolution};
use oxigraph::store::Store;
use std::io::BufRead;

const DATASET_QUERY: &str = r"
PREFIX void: <http://rdfs.org/ns/void#>
SELECT ?endpoint ?triples ?properties ?classes ?entities WHERE {
    ?dataset a void:Dataset .
    OPTIONAL { ?dataset void:sparqlEndpoint ?endpoint }
    OPTIONAL { ?dataset void:triples ?triples }
    OPTIONAL { ?dataset void:properties ?properties }
    OPTIONAL { ?dataset void:classes ?classes }
    OPTIONAL { ?dataset void:entities ?entities }
}";

const PROPERTY_QUERY: &str = r"
PREFIX void: <http://rdfs.org/ns/void#>
SELECT ?property ?triples ?subjects ?objects WHERE {
    ?dataset void:propertyPartition ?partition .
    ?partition void:property ?property .
    OPTIONAL { ?partition void:triples ?triples }
    OPTIONAL { ?partition void:distinctSubjects ?subjects }
    OPTIONAL { ?partition void:distinctObjects ?objects }
}";

const CLASS_QUERY: &str = r"
PREFIX void: <http://rdfs.org/ns/void#>
SELECT ?class ?entities WHERE {
    ?dataset void:classPartition ?partition .
    ?partition void:class ?class .
    OPTIONAL { ?partition void:entities ?entities }
}";

const TOTALS_STATS: &str = r"
SELECT (COUNT(*) AS ?triples) (COUNT(DISTINCT ?s) AS ?entities) WHERE { ?s ?p ?o }";

const PROPERTY_STATS: &str = r"
SELECT ?property (COUNT(*) AS ?triples) (COUNT(DISTINCT ?s) AS ?subjects)
       (COUNT(DISTINCT ?o) AS ?objects)
WHERE { ?s ?property ?o }
GROUP BY ?property";

const CLASS_STATS: &str = r"
SELECT ?class (COUNT(DISTINCT ?s) AS ?entities)
WHERE { ?s a ?class }
GROUP BY ?class";

/// Serialization of a VoID document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoidFormat {
    Turtle,
    NTriples,
}

impl VoidFormat {
    /// Guesses the format from a file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "ttl" | "n3" => Some(VoidFormat::Turtle),
            "nt" => Some(VoidFormat::NTriples),
            _ => None,
        }
    }

    fn graph_format(self) -> GraphFormat {
        match self {
            VoidFormat::Turtle => GraphFormat::Turtle,
            VoidFormat::NTriples => GraphFormat::NTriples,
        }
    }
}

/// Parses a VoID description of a single dataset.
pub fn read_void(reader: impl BufRead, format: VoidFormat) -> Result<SourceDescriptor> {
    let store = Store::new()?;
    store.load_graph(reader, format.graph_format(), GraphNameRef::DefaultGraph, None)?;

    let mut descriptor = SourceDescriptor::default();

    let mut datasets = 0;
    for solution in solutions(&store, DATASET_QUERY)? {
        datasets += 1;
        descriptor.endpoint = solution.get("endpoint").and_then(term_text);
        descriptor.triples = count(&solution, "triples")?;
        descriptor.properties = count(&solution, "properties")?;
        descriptor.classes = count(&solution, "classes")?;
        descriptor.entities = count(&solution, "entities")?;
    }
    if datasets > 1 {
        return Err(FederationError::Statistics(format!(
            "Expected one void:Dataset per statistics document, found {}",
            datasets
        )));
    }

    for solution in solutions(&store, PROPERTY_QUERY)? {
        let Some(property) = solution.get("property").and_then(iri_text) else {
            continue;
        };
        descriptor.property_partitions.push(PropertyPartition {
            property,
            stats: PredicateStats {
                triples: count(&solution, "triples")?.unwrap_or(0),
                distinct_subjects: count(&solution, "subjects")?.unwrap_or(0),
                distinct_objects: count(&solution, "objects")?.unwrap_or(0),
            },
        });
    }

    for solution in solutions(&store, CLASS_QUERY)? {
        let Some(class) = solution.get("class").and_then(iri_text) else {
            continue;
        };
        let entities = count(&solution, "entities")?.unwrap_or(0);
        descriptor.class_partitions.push(ClassPartition { class, entities });
    }

    Ok(descriptor)
}

/// Computes the statistics VoID would publish for the default graph of `store`.
pub fn describe_store(store: &Store) -> Result<SourceDescriptor> {
    let mut descriptor = SourceDescriptor::default();

    for solution in solutions(store, TOTALS_STATS)? {
        descriptor.triples = count(&solution, "triples")?;
        descriptor.entities = count(&solution, "entities")?;
    }

    for solution in solutions(store, PROPERTY_STATS)? {
        let Some(property) = solution.get("property").and_then(iri_text) else {
            continue;
        };
        descriptor.property_partitions.push(PropertyPartition {
            property,
            stats: PredicateStats {
                triples: count(&solution, "triples")?.unwrap_or(0),
                distinct_subjects: count(&solution, "subjects")?.unwrap_or(0),
                distinct_objects: count(&solution, "objects")?.unwrap_or(0),
            },
        });
    }

    for solution in solutions(store, CLASS_STATS)? {
        let Some(class) = solution.get("class").and_then(iri_text) else {
            continue;
        };
        let entities = count(&solution, "entities")?.unwrap_or(0);
        descriptor.class_partitions.push(ClassPartition { class, entities });
    }

    descriptor.properties = Some(descriptor.property_partitions.len() as u64);
    descriptor.classes = Some(descriptor.class_partitions.len() as u64);
    Ok(descriptor)
}

fn solutions(store: &Store, query: &str) -> Result<Vec<QuerySolution>> {
    match store.query(query)? {
        QueryResults::Solutions(solutions) => {
            solutions.map(|s| s.map_err(FederationError::from)).collect()
        }
        _ => Ok(Vec::new()),
    }
}

fn count(solution: &QuerySolution, variable: &str) -> Result<Option<u64>> {
    match solution.get(variable) {
        Some(Term::Literal(literal)) => {
            literal.value().trim().parse::<u64>().map(Some).map_err(|_| {
                FederationError::Statistics(format!(
                    "Expected a non-negative count for ?{}, got '{}'",
                    variable,
                    literal.value()
                ))
            })
        }
        Some(other) => Err(FederationError::Statistics(format!(
            "Expected a literal count for ?{}, got {}",
            variable, other
        ))),
        None => Ok(None),
    }
}

fn iri_text(term: &Term) -> Option<String> {
    match term {
        Term::NamedNode(node) => Some(node.as_str().to_string()),
        _ => None,
    }
}

fn term_text(term: &Term) -> Option<String> {
    match term {
        Term::NamedNode(node) => Some(node.as_str().to_string()),
        Term::Literal(literal) => Some(literal.value().to_string()),
        _ => None,
    }
}
