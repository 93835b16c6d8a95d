//! Query Optimizer
//!
//! Groups mapped fragments by source set, orders the groups greedily by
//! estimated join cardinality and places filters, producing a [`PlanNode`]
//! tree for the executor.

pub mod cost;
pub mod grouping;
pub mod plan;
pub mod query_optimizer;

pub use cost::{CostModel, Estimate, Relation};
pub use grouping::{group_fragments, Group};
pub use plan::{Operator, PlanNode};
pub use query_optimizer::QueryOptimizer;
