//! Error types for federated query processing

use crate::core::SourceId;
use thiserror::Error;

/// Result type alias for federation operations
pub type Result<T> = std::result::Result<T, FederationError>;

/// Main error type for the federation
#[derive(Error, Debug)]
pub enum FederationError {
    /// Invalid or incomplete federation configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed statistics document
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// Malformed query text
    #[error("Parse error: {0}")]
    Parse(String),

    /// The query or one of its groups uses an operator the federation cannot ship
    #[error("Unsupported fragment: {0}")]
    UnsupportedFragment(String),

    /// A remote source could not be reached or returned an error
    #[error("Source '{source_id}' unavailable: {message}")]
    SourceUnavailable { source_id: SourceId, message: String },

    /// The query deadline expired
    #[error("Query evaluation took too long ({elapsed_ms} ms)")]
    Timeout { elapsed_ms: u64 },

    /// The query was cancelled before it completed
    #[error("Query cancelled")]
    Cancelled,

    /// Local evaluation error (filters, result decoding)
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FederationError {
    /// Whether this error was caused by the query deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FederationError::Timeout { .. })
    }
}

impl From<spargebra::ParseError> for FederationError {
    fn from(err: spargebra::ParseError) -> Self {
        FederationError::Parse(err.to_string())
    }
}

impl From<oxigraph::sparql::EvaluationError> for FederationError {
    fn from(err: oxigraph::sparql::EvaluationError) -> Self {
        FederationError::Evaluation(err.to_string())
    }
}

impl From<oxigraph::store::LoaderError> for FederationError {
    fn from(err: oxigraph::store::LoaderError) -> Self {
        FederationError::Statistics(err.to_string())
    }
}

impl From<oxigraph::store::StorageError> for FederationError {
    fn from(err: oxigraph::store::StorageError) -> Self {
        FederationError::Evaluation(err.to_string())
    }
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::Config(err.to_string())
    }
}

/// Failure reported by a single source; converted into an annotation or a
/// [`FederationError::SourceUnavailable`] by the executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("malformed response: {0}")]
    Response(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            SourceError::Connection(err.to_string())
        } else {
            SourceError::Remote(err.to_string())
        }
    }
}

impl From<oxigraph::sparql::EvaluationError> for SourceError {
    fn from(err: oxigraph::sparql::EvaluationError) -> Self {
        SourceError::Remote(err.to_string())
    }
}
