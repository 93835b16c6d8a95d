//! Statistics Index
//!
//! Per-source property and class partition statistics, loaded once from VoID
//! or JSON descriptors and shared read-only by selection and optimization.

pub mod descriptor;
pub mod index;
pub mod void;

pub use descriptor::{ClassPartition, PredicateStats, PropertyPartition, SourceDescriptor};
pub use index::{SourceTotals, StatisticsIndex};
pub use void::{describe_store, read_void, VoidFormat};

use crate::error::{FederationError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Loads a statistics descriptor, choosing the parser from the file extension.
pub fn load_descriptor(path: &Path) -> Result<SourceDescriptor> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

    if extension.eq_ignore_ascii_case("json") {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FederationError::Statistics(format!("Cannot read {}: {}", path.display(), e))
        })?;
        return SourceDescriptor::from_json(&text);
    }

    let format = VoidFormat::from_extension(extension).ok_or_else(|| {
        FederationError::Statistics(format!(
            "Unknown statistics format for {} (expected .ttl, .nt or .json)",
            path.display()
        ))
    })?;
    let file = File::open(path).map_err(|e| {
        FederationError::Statistics(format!("Cannot read {}: {}", path.display(), e))
    })?;
    read_void(BufReader::new(file), format)
}
