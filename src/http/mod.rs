//! HTTP API module
//!
//! Provides a SPARQL protocol endpoint over the federation and a health check.

pub mod server;

pub use server::{
    create_server, start_server, ApiError, ErrorResponse, HealthResponse, SparqlRequest,
};
