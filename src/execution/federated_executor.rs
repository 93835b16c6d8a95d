//! Federated Executor
//!
//! Walks a [`PlanNode`] tree and streams the resulting bindings:
//!
//! - **Leaf** - the group is rendered once and sent to every candidate source
//!   concurrently; rows are unioned as they arrive.
//! - **Join** - the left side is evaluated fully, then the right leaf is
//!   re-rendered once per distinct binding of the shared variables (bound
//!   join). Without shared variables a nested-loop cross product is used.
//! - **Filter** - local row-by-row evaluation.
//! - **Union** - both branches run concurrently into the same output.
//!
//! Every remote call observes the query's [`CancelSignal`]. The deadline is
//! enforced by the driver task, which cancels the signal on expiry.

use super::context::{ExecutionContext, QueryInfo};
use super::filter_eval::evaluate_filter;
use crate::core::{Binding, SourceId};
use crate::error::{FederationError, Result, SourceError};
use crate::optimizer::{Estimate, Group, Operator, PlanNode};
use crate::parsing::FilterCondition;
use crate::sources::{Source, SourceRegistry};
use crate::subquery::SubQueryBuilder;
use futures_util::future::{join_all, try_join, BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use oxrdf::Term;
use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rows buffered between the driver task and the consumer.
const OUTPUT_BUFFER: usize = 256;
/// Rows buffered per source call.
const SOURCE_BUFFER: usize = 64;

type JoinKey = Vec<Option<Term>>;

/// Where an operator delivers its rows.
enum Sink<'a> {
    Channel(&'a mpsc::Sender<Result<Binding>>),
    Collect(&'a Mutex<Vec<Binding>>),
    Filter { condition: &'a FilterCondition, next: &'a Sink<'a> },
}

impl Sink<'_> {
    async fn push(&self, row: Binding) -> Result<()> {
        let mut sink = self;
        loop {
            match sink {
                Sink::Filter { condition, next } => {
                    if !evaluate_filter(&condition.expression, &row) {
                        return Ok(());
                    }
                    sink = next;
                }
                Sink::Collect(rows) => return store(rows, row),
                // A closed channel means the consumer went away.
                Sink::Channel(sender) => {
                    return sender.send(Ok(row)).await.map_err(|_| FederationError::Cancelled)
                }
            }
        }
    }
}

fn store(rows: &Mutex<Vec<Binding>>, row: Binding) -> Result<()> {
    rows.lock().map_err(|_| poisoned())?.push(row);
    Ok(())
}

fn poisoned() -> FederationError {
    FederationError::Evaluation("row buffer poisoned".to_string())
}

/// Stream of rows produced by [`FederatedExecutor::execute`].
///
/// The last item is an error if the query failed or timed out. Dropping the
/// stream cancels the query.
pub struct BindingStream {
    receiver: mpsc::Receiver<Result<Binding>>,
    context: ExecutionContext,
}

impl BindingStream {
    pub fn info(&self) -> &Arc<QueryInfo> {
        self.context.info()
    }

    pub fn cancel(&self) {
        self.context.cancel();
    }
}

impl Stream for BindingStream {
    type Item = Result<Binding>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for BindingStream {
    fn drop(&mut self) {
        self.context.cancel();
    }
}

pub struct FederatedExecutor {
    registry: Arc<SourceRegistry>,
    builder: SubQueryBuilder,
}

impl FederatedExecutor {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry, builder: SubQueryBuilder::new() }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Starts evaluating `plan` on a driver task and returns its rows lazily.
    pub fn execute(
        self: &Arc<Self>,
        plan: Arc<PlanNode>,
        context: ExecutionContext,
    ) -> BindingStream {
        let (sender, receiver) = mpsc::channel(OUTPUT_BUFFER);
        let executor = Arc::clone(self);
        let driver_context = context.clone();

        tokio::spawn(async move {
            let context = driver_context;
            let outcome = {
                let sink = Sink::Channel(&sender);
                tokio::select! {
                    result = executor.evaluate(&plan, &context, &sink) => result,
                    _ = wait_until(context.deadline()) => Err(context.expire()),
                    _ = context.cancel_signal().cancelled() => Err(FederationError::Cancelled),
                }
            };
            context.info().record_execution(context.elapsed());

            match outcome {
                Ok(()) => debug!("Query finished in {:?}", context.elapsed()),
                Err(FederationError::Cancelled) if !context.info().timed_out() => {
                    debug!("Query cancelled after {:?}", context.elapsed());
                }
                Err(e) => {
                    warn!("Query failed: {}", e);
                    let _ = sender.send(Err(e)).await;
                }
            }
        });

        BindingStream { receiver, context }
    }

    /// Evaluates `plan` to completion and returns every row.
    pub async fn execute_all(
        self: &Arc<Self>,
        plan: Arc<PlanNode>,
        context: ExecutionContext,
    ) -> Result<Vec<Binding>> {
        let mut stream = self.execute(plan, context);
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn evaluate<'a>(
        &'a self,
        node: &'a PlanNode,
        context: &'a ExecutionContext,
        sink: &'a Sink<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match &node.op {
                Operator::Empty => Ok(()),
                Operator::Leaf(group) => {
                    self.evaluate_leaf(group, node.estimate, None, context, sink).await
                }
                Operator::Filter { child, condition } => {
                    let filtered = Sink::Filter { condition, next: sink };
                    self.evaluate(child, context, &filtered).await
                }
                Operator::Union { left, right } => {
                    try_join(
                        self.evaluate(left, context, sink),
                        self.evaluate(right, context, sink),
                    )
                    .await?;
                    Ok(())
                }
                Operator::Join { left, right, shared } => {
                    self.evaluate_join(left, right, shared, context, sink).await
                }
            }
        }
        .boxed()
    }

    async fn collect(&self, node: &PlanNode, context: &ExecutionContext) -> Result<Vec<Binding>> {
        let rows = Mutex::new(Vec::new());
        self.evaluate(node, context, &Sink::Collect(&rows)).await?;
        rows.into_inner().map_err(|_| poisoned())
    }

    async fn evaluate_join(
        &self,
        left: &PlanNode,
        right: &PlanNode,
        shared: &BTreeSet<String>,
        context: &ExecutionContext,
        sink: &Sink<'_>,
    ) -> Result<()> {
        let left_rows = self.collect(left, context).await?;
        if left_rows.is_empty() {
            debug!("Left side of join is empty, skipping right side");
            return Ok(());
        }

        if shared.is_empty() {
            let right_rows = self.collect(right, context).await?;
            for left_row in &left_rows {
                for right_row in &right_rows {
                    if let Some(merged) = left_row.merge(right_row) {
                        sink.push(merged).await?;
                    }
                }
            }
            return Ok(());
        }

        match bound_target(right) {
            Some((group, conditions)) => {
                self.bound_join(&left_rows, shared, group, &conditions, context, sink).await
            }
            None => {
                let right_rows = self.collect(right, context).await?;
                for row in hash_join(&left_rows, &right_rows, shared) {
                    sink.push(row).await?;
                }
                Ok(())
            }
        }
    }

    /// Re-dispatches `group` once per distinct binding of `shared` in `left_rows`.
    async fn bound_join(
        &self,
        left_rows: &[Binding],
        shared: &BTreeSet<String>,
        group: &Group,
        conditions: &[&FilterCondition],
        context: &ExecutionContext,
        sink: &Sink<'_>,
    ) -> Result<()> {
        let mut partitions: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        let mut keys: Vec<JoinKey> = Vec::new();
        for (index, row) in left_rows.iter().enumerate() {
            let key = row.key(shared);
            partitions
                .entry(key.clone())
                .or_insert_with(|| {
                    keys.push(key);
                    Vec::new()
                })
                .push(index);
        }
        debug!("Bound join over {} distinct bindings of {:?}", keys.len(), shared);

        let partitions = &partitions;
        let limit = context.settings().max_concurrent_requests.max(1);
        let mut calls = stream::iter(keys)
            .map(|key| async move {
                let members = partitions.get(&key).map(Vec::as_slice).unwrap_or_default();
                let Some(first) = members.first() else {
                    return Ok(Vec::new());
                };
                let bound = left_rows[*first].project(shared.iter());

                let rows = Mutex::new(Vec::new());
                let collect = Sink::Collect(&rows);
                self.evaluate_leaf(group, Estimate::default(), Some(&bound), context, &collect)
                    .await?;
                let right_rows = rows.into_inner().map_err(|_| poisoned())?;

                let mut merged = Vec::new();
                for index in members {
                    for right_row in &right_rows {
                        if let Some(row) = left_rows[*index].merge(right_row) {
                            if conditions.iter().all(|c| evaluate_filter(&c.expression, &row)) {
                                merged.push(row);
                            }
                        }
                    }
                }
                Ok::<_, FederationError>(merged)
            })
            .buffer_unordered(limit);

        while let Some(result) = calls.next().await {
            for row in result? {
                sink.push(row).await?;
            }
        }
        Ok(())
    }

    async fn evaluate_leaf(
        &self,
        group: &Group,
        estimate: Estimate,
        bound: Option<&Binding>,
        context: &ExecutionContext,
        sink: &Sink<'_>,
    ) -> Result<()> {
        // Rendering fails fast before anything is sent.
        let query = match bound {
            Some(binding) => self.builder.render_bound(group, binding)?,
            None => self.builder.render(group)?,
        };

        let mut candidates: Vec<SourceId> = group.sources.iter().cloned().collect();
        let settings = context.settings();
        if bound.is_none()
            && group.is_unselective()
            && candidates.len() > 1
            && estimate.cardinality > settings.probe_threshold
        {
            candidates = self.probe(group, candidates, context).await?;
        }

        context.check_active()?;
        let mut streams = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.registry.get(&id) {
                Some(source) => {
                    context.info().count_request();
                    streams.push(dispatch(Arc::clone(source), query.clone(), context));
                }
                None => {
                    warn!("Source '{}' is not registered", id);
                    context.info().record_failure(id, "source is not registered");
                }
            }
        }

        let mut rows = stream::select_all(streams);
        while let Some((id, row)) = rows.next().await {
            match row {
                Ok(row) => sink.push(row.scope_blank_nodes(id.as_str())).await?,
                Err(SourceError::Cancelled) => return Err(FederationError::Cancelled),
                Err(e) => {
                    warn!("Source '{}' failed: {}", id, e);
                    context.info().record_failure(id, e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Sends an ASK probe to every candidate and keeps the ones answering `true`.
    async fn probe(
        &self,
        group: &Group,
        candidates: Vec<SourceId>,
        context: &ExecutionContext,
    ) -> Result<Vec<SourceId>> {
        let query = self.builder.render_ask(group)?;
        context.check_active()?;

        let query = &query;
        let answers = join_all(candidates.into_iter().map(|id| async move {
            let Some(source) = self.registry.get(&id) else {
                return (id, Err(SourceError::Connection("source is not registered".to_string())));
            };
            context.info().count_probe();
            let answer = source.ask(query, context.cancel_signal().clone()).await;
            (id, answer)
        }))
        .await;

        let mut kept = Vec::new();
        for (id, answer) in answers {
            match answer {
                Ok(true) => kept.push(id),
                Ok(false) => debug!("Probe pruned source '{}'", id),
                Err(SourceError::Cancelled) => return Err(FederationError::Cancelled),
                Err(e) => {
                    warn!("Probe to '{}' failed: {}", id, e);
                    context.info().record_failure(id, e.to_string());
                }
            }
        }
        Ok(kept)
    }
}

/// Runs one source call on its own task so the source sees cancellation even
/// when the consumer stops polling.
fn dispatch(
    source: Arc<dyn Source>,
    query: String,
    context: &ExecutionContext,
) -> BoxStream<'static, (SourceId, std::result::Result<Binding, SourceError>)> {
    let (sender, receiver) = mpsc::channel(SOURCE_BUFFER);
    let cancel = context.cancel_signal().clone();
    let id = source.id().clone();

    tokio::spawn(async move {
        let mut rows = source.select(&query, cancel);
        while let Some(row) = rows.next().await {
            if sender.send(row).await.is_err() {
                break;
            }
        }
    });

    stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|row| (row, receiver))
    })
    .map(move |row| (id.clone(), row))
    .boxed()
}

/// The leaf a bound join can re-dispatch, with the filters wrapped around it.
fn bound_target(node: &PlanNode) -> Option<(&Group, Vec<&FilterCondition>)> {
    match &node.op {
        Operator::Leaf(group) => Some((group, Vec::new())),
        Operator::Filter { child, condition } => {
            let (group, mut conditions) = bound_target(child)?;
            conditions.push(condition);
            Some((group, conditions))
        }
        _ => None,
    }
}

fn hash_join(left: &[Binding], right: &[Binding], shared: &BTreeSet<String>) -> Vec<Binding> {
    let mut index: HashMap<JoinKey, Vec<&Binding>> = HashMap::new();
    let mut partial: Vec<&Binding> = Vec::new();
    for row in right {
        let key = row.key(shared);
        if key.iter().all(Option::is_some) {
            index.entry(key).or_default().push(row);
        } else {
            partial.push(row);
        }
    }

    let mut joined = Vec::new();
    for left_row in left {
        let key = left_row.key(shared);
        let candidates: Vec<&Binding> = if key.iter().all(Option::is_some) {
            index.get(&key).into_iter().flatten().chain(partial.iter()).copied().collect()
        } else {
            right.iter().collect()
        };
        joined.extend(candidates.into_iter().filter_map(|right_row| left_row.merge(right_row)));
    }
    joined
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    fn iri(value: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://ex/{}", value))
    }

    #[test]
    fn test_hash_join_merges_compatible_rows() {
        let left = vec![
            Binding::new().with("x", iri("a")).with("y", iri("b")),
            Binding::new().with("x", iri("c")).with("y", iri("d")),
        ];
        let right = vec![
            Binding::new().with("y", iri("b")).with("n", iri("bob")),
            Binding::new().with("y", iri("z")).with("n", iri("zed")),
        ];
        let shared: BTreeSet<String> = ["y".to_string()].into_iter().collect();

        let joined = hash_join(&left, &right, &shared);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].get("n"), Some(&Term::from(iri("bob"))));
        assert_eq!(joined[0].get("x"), Some(&Term::from(iri("a"))));
    }

    #[test]
    fn test_hash_join_partial_keys() {
        let left = vec![Binding::new().with("y", iri("b"))];
        let right = vec![Binding::new().with("n", iri("bob"))];
        let shared: BTreeSet<String> = ["y".to_string()].into_iter().collect();
        assert_eq!(hash_join(&left, &right, &shared).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_plan_yields_nothing() {
        let executor = Arc::new(FederatedExecutor::new(Arc::new(SourceRegistry::new())));
        let context = ExecutionContext::new(Default::default());
        let rows = executor.execute_all(Arc::new(PlanNode::empty()), context).await.unwrap();
        assert!(rows.is_empty());
    }
}
