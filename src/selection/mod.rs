//! Source selection

pub mod source_selector;

pub use source_selector::{MappedFragment, SourceSelector};
