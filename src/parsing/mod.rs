//! Query parsing and decomposition

pub mod query_parser;

pub use query_parser::{
    DecomposedQuery, FilterCondition, QueryBranch, QueryForm, QueryParser, SolutionModifiers,
};
