//! Sub-query serialization

pub mod builder;

pub use builder::SubQueryBuilder;
