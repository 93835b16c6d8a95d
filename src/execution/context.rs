//! Per-query execution state: deadline, cancellation and counters.

use crate::core::SourceId;
use crate::error::{FederationError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub const DEFAULT_PROBE_THRESHOLD: f64 = 10_000.0;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Cooperative cancellation shared by every remote call of one query.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender: Arc::new(sender), receiver }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any clone of the signal, so this only
        // returns once the flag is set.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A source that failed during a query and was left out of its leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub message: String,
}

/// Observability counters of one query.
#[derive(Debug, Default)]
pub struct QueryInfo {
    source_selection_us: AtomicU64,
    planning_us: AtomicU64,
    execution_us: AtomicU64,
    probe_queries: AtomicUsize,
    remote_requests: AtomicUsize,
    timed_out: AtomicBool,
    failures: Mutex<Vec<SourceFailure>>,
}

impl QueryInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_source_selection(&self, elapsed: Duration) {
        self.source_selection_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_planning(&self, elapsed: Duration) {
        self.planning_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_execution(&self, elapsed: Duration) {
        self.execution_us.store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn count_probe(&self) {
        self.probe_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_request(&self) {
        self.remote_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::Relaxed);
    }

    pub fn record_failure(&self, source: SourceId, message: impl Into<String>) {
        let failure = SourceFailure { source, message: message.into() };
        if let Ok(mut failures) = self.failures.lock() {
            if !failures.contains(&failure) {
                failures.push(failure);
            }
        }
    }

    pub fn source_selection_time(&self) -> Duration {
        Duration::from_micros(self.source_selection_us.load(Ordering::Relaxed))
    }

    pub fn planning_time(&self) -> Duration {
        Duration::from_micros(self.planning_us.load(Ordering::Relaxed))
    }

    pub fn execution_time(&self) -> Duration {
        Duration::from_micros(self.execution_us.load(Ordering::Relaxed))
    }

    pub fn probe_queries(&self) -> usize {
        self.probe_queries.load(Ordering::Relaxed)
    }

    pub fn remote_requests(&self) -> usize {
        self.remote_requests.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> Vec<SourceFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> QueryInfoSnapshot {
        QueryInfoSnapshot {
            source_selection_ms: self.source_selection_time().as_secs_f64() * 1000.0,
            planning_ms: self.planning_time().as_secs_f64() * 1000.0,
            execution_ms: self.execution_time().as_secs_f64() * 1000.0,
            probe_queries: self.probe_queries(),
            remote_requests: self.remote_requests(),
            timed_out: self.timed_out(),
            failures: self.failures(),
        }
    }
}

/// Serializable copy of [`QueryInfo`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryInfoSnapshot {
    pub source_selection_ms: f64,
    pub planning_ms: f64,
    pub execution_ms: f64,
    pub probe_queries: usize,
    pub remote_requests: usize,
    pub timed_out: bool,
    pub failures: Vec<SourceFailure>,
}

/// Tunables shared by every query of a federation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionSettings {
    pub timeout: Option<Duration>,
    /// Unselective leaves estimated above this many rows are probed with ASK first.
    pub probe_threshold: f64,
    /// Upper bound on concurrent bound-join sub-calls.
    pub max_concurrent_requests: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            probe_threshold: DEFAULT_PROBE_THRESHOLD,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

/// State of one running query.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancelSignal,
    info: Arc<QueryInfo>,
    settings: ExecutionSettings,
}

impl ExecutionContext {
    pub fn new(settings: ExecutionSettings) -> Self {
        Self::with_info(settings, Arc::new(QueryInfo::new()))
    }

    pub fn with_info(settings: ExecutionSettings, info: Arc<QueryInfo>) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: settings.timeout.map(|t| started + t),
            cancel: CancelSignal::new(),
            info,
            settings,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn info(&self) -> &Arc<QueryInfo> {
        &self.info
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Fails once the query has been cancelled; checked before every dispatch.
    pub fn check_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FederationError::Cancelled);
        }
        Ok(())
    }

    /// Marks the query as timed out and cancels all outstanding calls.
    pub fn expire(&self) -> FederationError {
        self.info.mark_timed_out();
        self.cancel();
        FederationError::Timeout { elapsed_ms: self.elapsed().as_millis() as u64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        assert!(!signal.is_cancelled());
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_failures_are_deduplicated() {
        let info = QueryInfo::new();
        info.record_failure(SourceId::new("A"), "down");
        info.record_failure(SourceId::new("A"), "down");
        info.record_failure(SourceId::new("B"), "down");
        assert_eq!(info.failures().len(), 2);
    }

    #[test]
    fn test_expire_marks_timeout_and_cancels() {
        let context = ExecutionContext::new(ExecutionSettings {
            timeout: Some(Duration::from_millis(1)),
            ..ExecutionSettings::default()
        });
        let err = context.expire();
        assert!(err.is_timeout());
        assert!(context.info().timed_out());
        assert!(context.check_active().is_err());
    }
}
