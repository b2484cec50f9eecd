//! Bounded-concurrency job dispatcher
//!
//! Drains a channel of [`UpdateJob`]s, running up to `max_concurrent_jobs` at
//! once. Faults are logged and counted; redelivery belongs to the queue.

use crate::error::AmError;
use crate::job::{UpdateJob, UpdateOutcome};
use crate::manager::AttributeManager;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Jobs that merged attributes
    pub applied: usize,
    /// Jobs that ended with a non-fault outcome other than applied
    pub skipped: usize,
    /// Jobs that returned an error or panicked
    pub failed: usize,
}

impl DispatchStats {
    /// Jobs accounted for
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }

    fn record(&mut self, result: Result<UpdateOutcome, AmError>) {
        match result {
            Ok(UpdateOutcome::Applied(_)) => self.applied += 1,
            Ok(outcome) => {
                tracing::debug!(%outcome, "job skipped");
                self.skipped += 1;
            }
            Err(err) => {
                tracing::error!(error = %err, retryable = err.is_retryable(), "job failed");
                self.failed += 1;
            }
        }
    }
}

/// Runs update jobs concurrently
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    manager: Arc<AttributeManager>,
    max_concurrent_jobs: usize,
}

impl JobDispatcher {
    /// Create dispatcher; a zero limit is raised to one
    #[must_use]
    pub fn new(manager: Arc<AttributeManager>, max_concurrent_jobs: usize) -> Self {
        Self {
            manager,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }

    /// Concurrency limit
    #[inline]
    #[must_use]
    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Process jobs until the channel closes and every job has finished
    pub async fn run(&self, mut jobs: mpsc::Receiver<UpdateJob>) -> DispatchStats {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut tasks: JoinSet<Result<UpdateOutcome, AmError>> = JoinSet::new();
        let mut stats = DispatchStats::default();

        while let Some(job) = jobs.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let manager = Arc::clone(&self.manager);
            tasks.spawn(async move {
                let _permit = permit;
                manager.update_attributes(&job).await
            });

            while let Some(done) = tasks.try_join_next() {
                Self::collect(&mut stats, done);
            }
        }

        while let Some(done) = tasks.join_next().await {
            Self::collect(&mut stats, done);
        }

        tracing::info!(
            applied = stats.applied,
            skipped = stats.skipped,
            failed = stats.failed,
            "dispatcher drained"
        );
        stats
    }

    /// Process a fixed batch of jobs
    pub async fn run_all(&self, jobs: impl IntoIterator<Item = UpdateJob>) -> DispatchStats {
        let jobs: Vec<UpdateJob> = jobs.into_iter().collect();
        let (tx, rx) = mpsc::channel(jobs.len().max(1));
        for job in jobs {
            if tx.try_send(job).is_err() {
                tracing::error!("job channel rejected a job");
            }
        }
        drop(tx);
        self.run(rx).await
    }

    fn collect(
        stats: &mut DispatchStats,
        done: Result<Result<UpdateOutcome, AmError>, tokio::task::JoinError>,
    ) {
        match done {
            Ok(result) => stats.record(result),
            Err(err) => {
                tracing::error!(error = %err, "job task panicked");
                stats.failed += 1;
            }
        }
    }
}
