use crate::{config::DeduplicationConfig, request_key::RequestKey};
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::oneshot;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

pub type DeduplicationResult<T, E> = Result<T, DeduplicationError<E>>;

/// Outcome of one in-flight execution, observable by any number of callers
type SharedOutcome<T, E> = Shared<BoxFuture<'static, DeduplicationResult<T, E>>>;

/// Per-call overrides of the deduplicator's configuration.
///
/// Only the call that creates an in-flight entry applies them. A call that
/// joins an existing entry shares that entry's timeout, logging and abort
/// behavior, and its own options are ignored.
#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub log_duplicates: Option<bool>,
    pub abort_on_timeout: Option<bool>,
}

impl ExecuteOptions {
    /// A negative timeout is treated as zero, so the call times out at once
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn log_duplicates(mut self, enabled: bool) -> Self {
        self.log_duplicates = Some(enabled);
        self
    }

    pub fn abort_on_timeout(mut self, enabled: bool) -> Self {
        self.abort_on_timeout = Some(enabled);
        self
    }
}

/// Registry record for a key with an execution in flight
struct InFlightEntry<T, E> {
    /// Distinguishes this entry from later ones for the same key
    generation: u64,
    started_at: DateTime<Utc>,
    /// Calls attached to this entry, the one that created it included
    joined: usize,
    outcome: SharedOutcome<T, E>,
}

struct Registry<T, E> {
    in_flight: DashMap<RequestKey, InFlightEntry<T, E>>,
    generation: AtomicU64,
    executions: AtomicU64,
    lifetime_prevented: AtomicU64,
}

impl<T, E> Registry<T, E> {
    /// Remove the entry created as `generation`, unless it was already discarded
    fn settle(&self, key: &RequestKey, generation: u64, log_duplicates: bool) {
        match self
            .in_flight
            .remove_if(key, |_, entry| entry.generation == generation)
        {
            Some((_, entry)) => {
                let prevented = entry.joined.saturating_sub(1);
                self.lifetime_prevented
                    .fetch_add(prevented as u64, Ordering::Relaxed);

                if log_duplicates && prevented > 0 {
                    log::info!(
                        "Prevented {} duplicate request(s) for key: {}",
                        prevented,
                        key
                    );
                }
            }
            None => {
                log::debug!(
                    "Request for key {} settled after its entry was cleared; outcome only reaches callers already waiting",
                    key
                );
            }
        }
    }
}

/// Request deduplication system.
///
/// When several callers ask for the same key while a request is in flight,
/// only the first one executes and every caller receives its outcome.
/// Clones share one registry.
pub struct RequestDeduplicator<T, E> {
    registry: Arc<Registry<T, E>>,
    config: DeduplicationConfig,
}

impl<T, E> Clone for RequestDeduplicator<T, E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<T, E> Default for RequestDeduplicator<T, E> {
    fn default() -> Self {
        Self::new(DeduplicationConfig::default())
    }
}

impl<T, E> RequestDeduplicator<T, E> {
    pub fn new(config: DeduplicationConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                in_flight: DashMap::new(),
                generation: AtomicU64::new(0),
                executions: AtomicU64::new(0),
                lifetime_prevented: AtomicU64::new(0),
            }),
            config,
        }
    }

    pub fn config(&self) -> &DeduplicationConfig {
        &self.config
    }

    /// Number of distinct keys with a request in flight
    pub fn pending_count(&self) -> usize {
        self.registry.in_flight.len()
    }

    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.registry.in_flight.contains_key(key)
    }

    /// Snapshot of the requests currently in flight, oldest first
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        let mut pending: Vec<_> = self
            .registry
            .in_flight
            .iter()
            .map(|entry| PendingRequest {
                key: entry.key().clone(),
                started_at: entry.value().started_at,
                joined: entry.value().joined,
            })
            .collect();
        pending.sort_by_key(|request| request.started_at);
        pending
    }

    /// Get statistics about deduplicated requests
    pub fn stats(&self) -> DeduplicationStats {
        let pending_requests = self.registry.in_flight.len();
        let total_prevented = self
            .registry
            .in_flight
            .iter()
            .map(|entry| entry.value().joined.saturating_sub(1))
            .sum();

        DeduplicationStats {
            pending_requests,
            total_prevented,
            executions: self.registry.executions.load(Ordering::Relaxed),
            lifetime_prevented: self.registry.lifetime_prevented.load(Ordering::Relaxed),
        }
    }

    /// Forget every in-flight request and reset the counters.
    ///
    /// Running operations are not cancelled; callers already waiting on them
    /// still receive their outcome, later callers start a fresh execution.
    /// The registry and the counters are reset one after the other, so an
    /// `execute` racing with the clear may keep its entry while its increment
    /// of `executions` is lost.
    pub fn clear_all(&self) {
        self.registry.in_flight.clear();
        self.registry.executions.store(0, Ordering::Relaxed);
        self.registry.lifetime_prevented.store(0, Ordering::Relaxed);
        log::info!("Request deduplicator cleared");
    }
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Execute `operation` with deduplication.
    ///
    /// If a request for `key` is already in flight, wait for its outcome
    /// instead of starting another one. Otherwise run `operation`, bounded by
    /// the timeout, and share the outcome with every caller that joined.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn execute<F, Fut>(
        &self,
        key: impl Into<RequestKey>,
        operation: F,
        options: ExecuteOptions,
    ) -> DeduplicationResult<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(DeduplicationError::EmptyKey);
        }

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.request_timeout());
        let timeout = timeout.to_std().unwrap_or(StdDuration::ZERO);
        let abort_on_timeout = options
            .abort_on_timeout
            .unwrap_or(self.config.abort_on_timeout);

        if !self.config.enabled {
            return run_operation(key, operation, timeout, abort_on_timeout).await;
        }

        let mut launch = None;
        let outcome = match self.registry.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.joined += 1;
                log::debug!(
                    "Request already pending for key: {} ({} callers)",
                    key,
                    entry.joined
                );
                entry.outcome.clone()
            }
            Entry::Vacant(vacant) => {
                log::debug!("Executing new request for key: {}", key);

                let generation = self.registry.generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                let outcome = receive_outcome(key.clone(), rx).boxed().shared();

                vacant.insert(InFlightEntry {
                    generation,
                    started_at: Utc::now(),
                    joined: 1,
                    outcome: outcome.clone(),
                });
                self.registry.executions.fetch_add(1, Ordering::Relaxed);

                launch = Some((generation, tx));
                outcome
            }
        };

        if let Some((generation, tx)) = launch {
            let registry = Arc::clone(&self.registry);
            let log_duplicates = options.log_duplicates.unwrap_or(self.config.log_duplicates);
            let key = key.clone();

            tokio::spawn(async move {
                let result = run_operation(key.clone(), operation, timeout, abort_on_timeout).await;
                registry.settle(&key, generation, log_duplicates);
                // Nobody listening is fine, the entry is already gone
                let _ = tx.send(result);
            });
        }

        outcome.await
    }
}

/// Run `operation` on its own task, giving up on it after `timeout`
async fn run_operation<T, E, F, Fut>(
    key: RequestKey,
    operation: F,
    timeout: StdDuration,
    abort_on_timeout: bool,
) -> DeduplicationResult<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let mut task = tokio::spawn(async move { operation().await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => result.map_err(DeduplicationError::Upstream),
        Ok(Err(join_error)) => {
            log::error!("Request for key {} did not complete: {}", key, join_error);
            Err(DeduplicationError::Aborted { key })
        }
        Err(_) => {
            if abort_on_timeout {
                task.abort();
            }
            log::warn!("Request timeout after {:?} for key: {}", timeout, key);
            Err(DeduplicationError::Timeout {
                key,
                timeout_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
            })
        }
    }
}

async fn receive_outcome<T, E>(
    key: RequestKey,
    rx: oneshot::Receiver<DeduplicationResult<T, E>>,
) -> DeduplicationResult<T, E> {
    match rx.await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Sender dropped for key: {}", key);
            Err(DeduplicationError::Abandoned { key })
        }
    }
}

/// A request currently in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub key: RequestKey,
    pub started_at: DateTime<Utc>,
    pub joined: usize,
}

/// Statistics for request deduplication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct DeduplicationStats {
    /// Keys with a request in flight
    pub pending_requests: usize,
    /// Calls currently waiting on another caller's execution
    pub total_prevented: usize,
    /// Executions started since creation or the last clear
    pub executions: u64,
    /// Duplicate calls answered by settled executions since creation or the last clear
    pub lifetime_prevented: u64,
}

/// Errors that can occur during request deduplication
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeduplicationError<E> {
    #[error("request failed: {0}")]
    Upstream(E),
    #[error("request {key} timed out after {timeout_ms}ms")]
    Timeout { key: RequestKey, timeout_ms: u64 },
    #[error("request key must not be empty")]
    EmptyKey,
    #[error("request {key} panicked or was cancelled")]
    Aborted { key: RequestKey },
    #[error("request {key} was abandoned before it settled")]
    Abandoned { key: RequestKey },
}

impl<E> DeduplicationError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeduplicationError::Timeout { .. })
    }

    pub fn upstream(&self) -> Option<&E> {
        match self {
            DeduplicationError::Upstream(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_upstream(self) -> Option<E> {
        match self {
            DeduplicationError::Upstream(error) => Some(error),
            _ => None,
        }
    }
}
