use super::Source;
use crate::core::SourceId;
use crate::error::{FederationError, Result, SourceError};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Connections of the federation, keyed by source id.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn Source>) -> Result<()> {
        let id = source.id().clone();
        if self.sources.contains_key(&id) {
            return Err(FederationError::Config(format!("Source '{}' registered twice", id)));
        }
        self.sources.insert(id, source);
        Ok(())
    }

    pub fn get(&self, id: &SourceId) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.keys()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Opens every source concurrently and returns the ones that failed.
    pub async fn open_all(&self) -> Vec<(SourceId, SourceError)> {
        let results = join_all(self.sources.values().map(|source| async move {
            (source.id().clone(), source.open().await)
        }))
        .await;

        let mut failures = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => info!("Source '{}' ready", id),
                Err(e) => {
                    warn!("Source '{}' could not be opened: {}", id, e);
                    failures.push((id, e));
                }
            }
        }
        failures
    }

    pub async fn close_all(&self) {
        join_all(self.sources.values().map(|source| source.close())).await;
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.sources.keys()).finish()
    }
}
