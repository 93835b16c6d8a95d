//! Solution modifiers applied to the federated rows.

use super::context::QueryInfo;
use super::federated_executor::BindingStream;
use crate::core::Binding;
use crate::error::Result;
use crate::parsing::SolutionModifiers;
use futures_util::stream::Stream;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Result rows of one query, projected and sliced.
///
/// DISTINCT and REDUCED both remove duplicates. Once LIMIT rows have been
/// returned the outstanding remote calls are cancelled.
pub struct QueryStream {
    inner: BindingStream,
    variables: Vec<String>,
    distinct: bool,
    seen: HashSet<Binding>,
    offset: usize,
    skipped: usize,
    limit: Option<usize>,
    returned: usize,
}

impl QueryStream {
    pub fn new(
        inner: BindingStream,
        variables: Vec<String>,
        modifiers: &SolutionModifiers,
    ) -> Self {
        Self {
            inner,
            variables,
            distinct: modifiers.distinct || modifiers.reduced,
            seen: HashSet::new(),
            offset: modifiers.offset,
            skipped: 0,
            limit: modifiers.limit,
            returned: 0,
        }
    }

    /// Output variables in order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Counters of the running query; complete once the stream has ended.
    pub fn info(&self) -> &Arc<QueryInfo> {
        self.inner.info()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl Stream for QueryStream {
    type Item = Result<Binding>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.limit.map_or(false, |limit| this.returned >= limit) {
                this.inner.cancel();
                return Poll::Ready(None);
            }
            let row = match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(row)) => row.project(this.variables.iter()),
                other => return Poll::Ready(other),
            };
            if this.distinct && !this.seen.insert(row.clone()) {
                continue;
            }
            if this.skipped < this.offset {
                this.skipped += 1;
                continue;
            }
            this.returned += 1;
            return Poll::Ready(Some(Ok(row)));
        }
    }
}
