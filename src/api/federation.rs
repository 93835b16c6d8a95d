//! Federation facade
//!
//! Owns the read-only statistics of the federation and the source
//! connections, and runs incoming queries through the pipeline:
//! parse, source selection, optimization, federated execution.

use crate::config::{FederationConfig, SourceKind};
use crate::core::{SourceId, SourceSet, TriplePattern};
use crate::error::{FederationError, Result};
use crate::execution::{
    ExecutionContext, ExecutionSettings, FederatedExecutor, QueryInfo, QueryStream,
};
use crate::optimizer::{PlanNode, QueryOptimizer};
use crate::parsing::{DecomposedQuery, QueryForm, QueryParser, SolutionModifiers};
use crate::selection::{MappedFragment, SourceSelector};
use crate::sources::http_source::build_client;
use crate::sources::{HttpSparqlSource, MemorySource, Source, SourceRegistry};
use crate::statistics::{load_descriptor, StatisticsIndex};
use futures_util::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a federated query.
pub enum QueryResponse {
    /// Rows of a SELECT query, streamed as they arrive.
    Solutions(QueryStream),
    Boolean { value: bool, info: Arc<QueryInfo> },
}

impl QueryResponse {
    pub fn info(&self) -> &Arc<QueryInfo> {
        match self {
            QueryResponse::Solutions(stream) => stream.info(),
            QueryResponse::Boolean { info, .. } => info,
        }
    }
}

impl fmt::Debug for QueryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResponse::Solutions(stream) => {
                f.debug_tuple("Solutions").field(&stream.variables()).finish()
            }
            QueryResponse::Boolean { value, .. } => f.debug_tuple("Boolean").field(value).finish(),
        }
    }
}

/// Patterns answered by one remote call and the sources it is sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub patterns: Vec<TriplePattern>,
    pub sources: SourceSet,
}

impl fmt::Display for SourceReport {
    /// `[patterns];#sources;[sources]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<String> = self.patterns.iter().map(ToString::to_string).collect();
        let sources: Vec<&str> = self.sources.iter().map(SourceId::as_str).collect();
        write!(
            f,
            "[{}];{};[{}]",
            patterns.join(", "),
            self.sources.len(),
            sources.join(", ")
        )
    }
}

pub struct Federation {
    parser: QueryParser,
    selector: SourceSelector,
    optimizer: QueryOptimizer,
    executor: Arc<FederatedExecutor>,
    settings: ExecutionSettings,
}

impl Federation {
    pub fn new(
        statistics: Arc<StatisticsIndex>,
        registry: SourceRegistry,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            parser: QueryParser::new(),
            selector: SourceSelector::new(statistics),
            optimizer: QueryOptimizer::new(),
            executor: Arc::new(FederatedExecutor::new(Arc::new(registry))),
            settings,
        }
    }

    /// Loads statistics and connects every configured source.
    ///
    /// Sources that cannot be opened stay registered; their failures are
    /// reported per query.
    pub async fn from_config(config: &FederationConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(config.request_timeout())?;
        let mut statistics = StatisticsIndex::new();
        let mut registry = SourceRegistry::new();

        for source_config in &config.sources {
            let id = SourceId::new(source_config.id.as_str());
            statistics.register_source(id.clone());

            let descriptor = match &source_config.statistics {
                Some(path) => Some(load_descriptor(path)?),
                None => None,
            };

            let source: Arc<dyn Source> = match source_config.kind {
                SourceKind::Sparql => {
                    let endpoint = source_config
                        .endpoint
                        .clone()
                        .or_else(|| descriptor.as_ref().and_then(|d| d.endpoint.clone()))
                        .ok_or_else(|| {
                            FederationError::Config(format!(
                                "No endpoint configured for source '{}'",
                                id
                            ))
                        })?;
                    match &descriptor {
                        Some(descriptor) => statistics.add_descriptor(&id, descriptor)?,
                        None => warn!(
                            "Source '{}' has no statistics and will only match unbound predicates",
                            id
                        ),
                    }
                    Arc::new(HttpSparqlSource::new(id.clone(), endpoint, client.clone()))
                }
                SourceKind::Memory => {
                    let source = MemorySource::new(id.clone())?;
                    if let Some(path) = &source_config.data {
                        source.load_file(path)?;
                    }
                    let descriptor = match descriptor {
                        Some(descriptor) => descriptor,
                        None => source.describe()?,
                    };
                    statistics.add_descriptor(&id, &descriptor)?;
                    Arc::new(source)
                }
            };
            registry.register(source)?;
        }

        info!(
            "Federation of {} sources ({} predicates, {} classes indexed)",
            statistics.source_count(),
            statistics.predicate_count(),
            statistics.type_count()
        );
        registry.open_all().await;
        Ok(Self::new(Arc::new(statistics), registry, config.execution_settings()))
    }

    pub fn statistics(&self) -> &Arc<StatisticsIndex> {
        self.selector.statistics()
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        self.executor.registry()
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Builds the operator tree of a query without executing it.
    pub fn plan(&self, text: &str) -> Result<PlanNode> {
        let query = self.parser.parse(text)?;
        self.plan_query(&query, &QueryInfo::new())
    }

    /// Human-readable operator tree with estimates.
    pub fn explain(&self, text: &str) -> Result<String> {
        Ok(self.plan(text)?.to_string())
    }

    /// Groups of patterns and their candidate sources, per union branch.
    pub fn select_sources(&self, text: &str) -> Result<Vec<SourceReport>> {
        let query = self.parser.parse(text)?;
        let mut reports = Vec::new();
        for branch in &query.branches {
            let mapped = self.selector.map_sources(&branch.fragments);
            for group in self.optimizer.group(&mapped) {
                reports.push(SourceReport {
                    patterns: group.patterns().cloned().collect(),
                    sources: group.sources.clone(),
                });
            }
        }
        Ok(reports)
    }

    /// Runs a SELECT or ASK query.
    pub async fn query(&self, text: &str) -> Result<QueryResponse> {
        let info = Arc::new(QueryInfo::new());
        let query = self.parser.parse(text)?;
        let plan = Arc::new(self.plan_query(&query, &info)?);
        let context = ExecutionContext::with_info(self.settings, Arc::clone(&info));
        let variables = query.result_variables();

        match query.form {
            QueryForm::Select => {
                let rows = self.executor.execute(plan, context);
                Ok(QueryResponse::Solutions(QueryStream::new(rows, variables, &query.modifiers)))
            }
            QueryForm::Ask => {
                let modifiers =
                    SolutionModifiers { limit: Some(1), ..SolutionModifiers::default() };
                let rows = self.executor.execute(plan, context);
                let mut rows = QueryStream::new(rows, variables, &modifiers);
                let value = match rows.next().await {
                    Some(Ok(_)) => true,
                    Some(Err(e)) => return Err(e),
                    None => false,
                };
                Ok(QueryResponse::Boolean { value, info })
            }
        }
    }

    /// Closes every source connection.
    pub async fn close(&self) {
        self.executor.registry().close_all().await;
    }

    fn plan_query(&self, query: &DecomposedQuery, info: &QueryInfo) -> Result<PlanNode> {
        let started = Instant::now();
        let branches: Vec<(Vec<MappedFragment>, Vec<_>)> = query
            .branches
            .iter()
            .map(|branch| {
                let mapped = self.selector.map_sources(&branch.fragments);
                (mapped, self.selector.scope_filters(&branch.filters))
            })
            .collect();
        info.record_source_selection(started.elapsed());

        let started = Instant::now();
        let plan = self.optimizer.optimize_union(&branches)?;
        info.record_planning(started.elapsed());

        debug!("Plan for {} fragments:\n{}", query.fragment_count(), plan);
        Ok(plan)
    }
}
