//! Public entry point of the federation.

pub mod federation;

pub use federation::{Federation, QueryResponse, SourceReport};
