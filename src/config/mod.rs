//! Federation configuration
//!
//! A JSON document listing the member sources and the execution tunables:
//!
//! ```json
//! {
//!   "sources": [
//!     {
//!       "id": "dbpedia",
//!       "endpoint": "http://localhost:8890/sparql",
//!       "statistics": "dbpedia.void.ttl"
//!     },
//!     { "id": "local", "kind": "memory", "data": "local.ttl" }
//!   ],
//!   "timeout_ms": 30000,
//!   "max_concurrent_requests": 16
//! }
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use crate::error::{FederationError, Result};
use crate::execution::context::{DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_PROBE_THRESHOLD};
use crate::execution::ExecutionSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Remote SPARQL 1.1 protocol endpoint.
    #[default]
    Sparql,
    /// RDF file loaded into an in-process store.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub kind: SourceKind,
    /// Endpoint URL; taken from the VoID `sparqlEndpoint` when omitted.
    pub endpoint: Option<String>,
    /// Data file of a memory source.
    pub data: Option<PathBuf>,
    /// VoID (Turtle/N-Triples) or JSON statistics document.
    pub statistics: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationConfig {
    pub sources: Vec<SourceConfig>,
    /// Per-query deadline; no deadline when omitted.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_probe_threshold")]
    pub probe_threshold: f64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_probe_threshold() -> f64 {
    DEFAULT_PROBE_THRESHOLD
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl FederationConfig {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources,
            timeout_ms: None,
            probe_threshold: default_probe_threshold(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Parses and validates a config document. Paths are kept as written.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FederationError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Self = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Makes every relative data and statistics path relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            for path in [&mut source.data, &mut source.statistics].into_iter().flatten() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(FederationError::Config("At least one source is required".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(FederationError::Config(
                "max_concurrent_requests must be positive".to_string(),
            ));
        }
        if self.probe_threshold.is_nan() || self.probe_threshold < 0.0 {
            return Err(FederationError::Config(format!(
                "probe_threshold must be non-negative, got {}",
                self.probe_threshold
            )));
        }

        let mut ids = BTreeSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(FederationError::Config("Source ids must not be empty".to_string()));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(FederationError::Config(format!("Duplicate source id '{}'", source.id)));
            }
            match source.kind {
                SourceKind::Memory if source.data.is_none() => {
                    return Err(FederationError::Config(format!(
                        "Memory source '{}' needs a data file",
                        source.id
                    )));
                }
                SourceKind::Sparql if source.endpoint.is_none() && source.statistics.is_none() => {
                    return Err(FederationError::Config(format!(
                        "SPARQL source '{}' needs an endpoint or a VoID document with one",
                        source.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            timeout: self.timeout_ms.map(Duration::from_millis),
            probe_threshold: self.probe_threshold,
            max_concurrent_requests: self.max_concurrent_requests,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
