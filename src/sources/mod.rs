//! Federation members
//!
//! A [`Source`] answers SPARQL sub-queries for one dataset. Two
//! implementations are provided: [`HttpSparqlSource`] for remote SPARQL
//! endpoints and [`MemorySource`] for datasets loaded into an in-process
//! oxigraph store.

pub mod http_source;
pub mod memory_source;
pub mod registry;

pub use http_source::HttpSparqlSource;
pub use memory_source::MemorySource;
pub use registry::SourceRegistry;

use crate::core::{Binding, SourceId};
use crate::error::SourceError;
use crate::execution::CancelSignal;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Stream of rows returned by a source for one sub-query.
pub type RowStream = BoxStream<'static, Result<Binding, SourceError>>;

/// Connection to one dataset of the federation.
///
/// Implementations must observe the cancel signal passed to `select` and
/// `ask`: once it fires, outstanding work should stop and the stream should
/// end with [`SourceError::Cancelled`].
#[async_trait]
pub trait Source: Send + Sync {
    fn id(&self) -> &SourceId;

    /// Checks that the source is reachable.
    async fn open(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn close(&self) {}

    /// Evaluates a SELECT sub-query.
    fn select(&self, query: &str, cancel: CancelSignal) -> RowStream;

    /// Evaluates an ASK probe.
    async fn ask(&self, query: &str, cancel: CancelSignal) -> Result<bool, SourceError>;
}
