//! Datasets held in an in-process oxigraph store.

use super::{RowStream, Source};
use crate::core::{Binding, SourceId};
use crate::error::{FederationError, Result, SourceError};
use crate::execution::CancelSignal;
use crate::statistics::{describe_store, SourceDescriptor};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use oxigraph::io::GraphFormat;
use oxigraph::model::GraphNameRef;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct MemorySource {
    id: SourceId,
    store: Store,
    requests: AtomicUsize,
}

impl MemorySource {
    pub fn new(id: SourceId) -> Result<Self> {
        Ok(Self::from_store(id, Store::new()?))
    }

    pub fn from_store(id: SourceId, store: Store) -> Self {
        Self { id, store, requests: AtomicUsize::new(0) }
    }

    /// Convenience constructor for Turtle data.
    pub fn from_turtle(id: SourceId, data: &str) -> Result<Self> {
        let source = Self::new(id)?;
        source.load(data.as_bytes(), GraphFormat::Turtle)?;
        Ok(source)
    }

    pub fn load(&self, data: impl std::io::BufRead, format: GraphFormat) -> Result<()> {
        self.store
            .load_graph(data, format, GraphNameRef::DefaultGraph, None)
            .map_err(|e| {
                FederationError::Config(format!("Cannot load data into {}: {}", self.id, e))
            })
    }

    /// Loads a Turtle, N-Triples or RDF/XML file.
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let format = match extension.as_deref() {
            Some("ttl") | Some("n3") => GraphFormat::Turtle,
            Some("nt") => GraphFormat::NTriples,
            Some("rdf") | Some("xml") | Some("owl") => GraphFormat::RdfXml,
            _ => {
                return Err(FederationError::Config(format!(
                    "Unknown RDF format for {} (expected .ttl, .nt or .rdf)",
                    path.display()
                )))
            }
        };
        let file = File::open(path).map_err(|e| {
            FederationError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.load(BufReader::new(file), format)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Statistics of the loaded data, used when no descriptor is configured.
    pub fn describe(&self) -> Result<SourceDescriptor> {
        describe_store(&self.store)
    }

    /// Number of sub-queries and probes this source has answered.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn evaluate(&self, query: &str) -> std::result::Result<Vec<Binding>, SourceError> {
        match self.store.query(query)? {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution?;
                    rows.push(
                        solution
                            .iter()
                            .map(|(variable, term)| (variable.as_str().to_string(), term.clone()))
                            .collect(),
                    );
                }
                Ok(rows)
            }
            _ => Err(SourceError::Response("expected solutions".to_string())),
        }
    }
}

#[async_trait]
impl Source for MemorySource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn select(&self, query: &str, cancel: CancelSignal) -> RowStream {
        if cancel.is_cancelled() {
            return stream::iter(vec![Err(SourceError::Cancelled)]).boxed();
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        let rows: Vec<std::result::Result<Binding, SourceError>> = match self.evaluate(query) {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(rows).boxed()
    }

    async fn ask(
        &self,
        query: &str,
        cancel: CancelSignal,
    ) -> std::result::Result<bool, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        match self.store.query(query)? {
            QueryResults::Boolean(value) => Ok(value),
            _ => Err(SourceError::Response("expected a boolean".to_string())),
        }
    }
}
