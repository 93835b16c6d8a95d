//! Query Execution Module
//!
//! # Components
//!
//! - **FederatedExecutor** - Evaluates operator trees against the registered sources
//! - **ExecutionContext** - Deadline, cancellation signal and counters of one query
//! - **QueryStream** - Applies projection, DISTINCT and OFFSET/LIMIT to the federated rows
//! - **ResultConverter** - Reads and writes SPARQL JSON results
//!
//! # Example
//!
//! ```ignore
//! use federator::execution::{ExecutionContext, ExecutionSettings, FederatedExecutor};
//!
//! let executor = Arc::new(FederatedExecutor::new(registry));
//! let context = ExecutionContext::new(ExecutionSettings::default());
//! let mut rows = executor.execute(Arc::new(plan), context);
//!
//! while let Some(row) = rows.next().await {
//!     println!("{}", row?);
//! }
//! ```

pub mod context;
pub mod federated_executor;
pub mod filter_eval;
pub mod query_stream;
pub mod result_converter;

// Re-export main types for convenience
pub use context::{
    CancelSignal, ExecutionContext, ExecutionSettings, QueryInfo, QueryInfoSnapshot, SourceFailure,
};
pub use federated_executor::{BindingStream, FederatedExecutor};
pub use query_stream::QueryStream;
