//! Bounded fan-out/fan-in execution of independent work items.
//!
//! [`BoundedExecutor`] applies one async worker to every item of a batch with a
//! fixed concurrency ceiling. It knows nothing about fetching or scanning; the
//! pipeline instantiates it once per stage.
//!
//! Guarantees:
//! - at most `limit` workers hold a permit at any moment
//! - every item yields exactly one [`Outcome`], including items whose worker
//!   panicked
//! - `run` returns only after every item has finished; a failure never
//!   short-circuits the rest of the batch

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::types::Outcome;

/// Runs a worker over a batch of items with at most `limit` in flight
#[derive(Clone, Debug)]
pub struct BoundedExecutor {
    name: &'static str,
    limit: usize,
}

impl BoundedExecutor {
    /// Create an executor for the named stage
    ///
    /// A `limit` of 0 is raised to 1; configuration validation rejects 0 before
    /// it gets here.
    pub fn new(name: &'static str, limit: usize) -> Self {
        if limit == 0 {
            tracing::warn!(stage = name, "Concurrency limit of 0 raised to 1");
        }
        Self {
            name,
            limit: limit.max(1),
        }
    }

    /// The effective concurrency ceiling
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Apply `worker` to every item and collect one outcome per item
    ///
    /// Each item runs in its own task and must acquire a permit from a pool of
    /// `limit` permits before the worker starts. The permit is owned by the task,
    /// so it is released on every exit path: success, error, or panic.
    ///
    /// Outcomes are returned in input order; they carry their item, so callers
    /// that reorder them can still re-correlate.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, worker: F) -> Vec<Outcome<I, T>>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = items.len();
        tracing::debug!(stage = self.name, items = total, limit = self.limit, "Starting batch");

        let permits = Arc::new(Semaphore::new(self.limit));
        let worker = Arc::new(worker);

        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let permits = Arc::clone(&permits);
                let worker = Arc::clone(&worker);
                let task_item = item.clone();
                let handle = tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::WorkerPanicked(format!("permit pool closed: {}", e)))?;
                    worker(task_item).await
                });
                (item, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        for (item, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(stage = self.name, error = %e, "Worker task panicked");
                    Err(Error::WorkerPanicked(e.to_string()))
                }
            };
            outcomes.push(Outcome::from_result(item, result));
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        tracing::debug!(
            stage = self.name,
            items = total,
            failed = failed,
            "Batch finished"
        );
        outcomes
    }
}
