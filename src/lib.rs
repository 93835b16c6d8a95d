//! # Federator
//!
//! Federator answers SPARQL queries over a federation of independent RDF
//! sources without copying their data.
//!
//! Per-source statistics (VoID property and class partitions) decide which
//! sources can contribute to each triple pattern. Patterns with the same
//! candidate sources are grouped into one remote sub-query, the groups are
//! ordered greedily by estimated join cardinality, and the resulting operator
//! tree is executed with concurrent bound joins under a shared deadline.
//!
//! ## Features
//!
//! - Statistics from VoID (Turtle/N-Triples) or JSON descriptors
//! - Remote SPARQL endpoints and in-process oxigraph stores as sources
//! - Cost-based grouping and join ordering with filter push-down
//! - Timeouts with cooperative cancellation and partial-result annotations
//!
//! ## Example
//!
//! ```rust,ignore
//! use federator::api::{Federation, QueryResponse};
//! use federator::config::FederationConfig;
//!
//! let config = FederationConfig::from_file("federation.json".as_ref())?;
//! let federation = Federation::from_config(&config).await?;
//! let response = federation.query("SELECT * WHERE { ?s ?p ?o }").await?;
//! if let QueryResponse::Solutions(mut rows) = response {
//!     while let Some(row) = rows.next().await {
//!         println!("{}", row?);
//!     }
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_lines)]

/// Public facade: parse, select, plan and execute
pub mod api;

/// Federation configuration
pub mod config;

/// Core data structures and types
pub mod core;

pub mod error;

/// Federated execution of operator trees
pub mod execution;

/// HTTP SPARQL endpoint
pub mod http;

/// Grouping, cost model and join ordering
pub mod optimizer;

/// Module for parsing and decomposing SPARQL queries
pub mod parsing;

/// Statistics-driven source selection
pub mod selection;

/// Remote and in-process data sources
pub mod sources;

/// Per-source statistics
pub mod statistics;

/// Rendering of groups into remote sub-queries
pub mod subquery;

// Re-export commonly used types
pub use error::{FederationError, Result, SourceError};
