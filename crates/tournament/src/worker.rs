//! The worker loop
//!
//! ```text
//! IDLE -> SELECTING -> EXECUTING -> PROCESSING -> IDLE
//!            ^  |                        |
//!            +--+ empty pool (backoff)   +-> SELECTING on a voided match
//! ```
//!
//! A stop request is honoured only between matches: once a match has been
//! handed to the executor it runs to completion (or to its own wall-clock
//! ceiling) and is processed before the loop exits.

use arena_core::{select_participants, MatchRecord, MatchSize, RatingModel};
use arena_runner::{MatchExecutor, MatchPlan};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::processor::{ProcessError, Processed, ResultProcessor};
use crate::storage::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerState {
    Idle,
    Selecting,
    Executing(MatchPlan),
    Processing(MatchRecord),
    ShuttingDown,
}

impl WorkerState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Selecting => "selecting",
            WorkerState::Executing(_) => "executing",
            WorkerState::Processing(_) => "processing",
            WorkerState::ShuttingDown => "shutting_down",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub size: MatchSize,
    /// Square map sizes to draw from; empty leaves the size to the simulator
    pub map_sizes: Vec<u32>,
    /// Wait after an empty pool or a storage failure
    pub backoff: Duration,
    /// Stop after this many executed matches
    pub max_matches: Option<u64>,
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub recorded: u64,
    pub voided: u64,
    pub storage_failures: u64,
    pub empty_pool_waits: u64,
}

pub struct Worker<S, E> {
    processor: ResultProcessor<S>,
    executor: E,
    options: WorkerOptions,
    rng: StdRng,
}

impl<S, E> Worker<S, E>
where
    S: Store + 'static,
    E: MatchExecutor,
{
    pub fn new(store: Arc<S>, executor: E, model: RatingModel, options: WorkerOptions) -> Self {
        Self {
            processor: ResultProcessor::new(store, model),
            executor,
            options,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Run until `shutdown` turns true or `max_matches` is reached.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut executed = 0u64;
        let mut state = WorkerState::Idle;

        loop {
            if matches!(state, WorkerState::Idle | WorkerState::Selecting) {
                let limit_reached = self.options.max_matches.is_some_and(|max| executed >= max);
                if *shutdown.borrow() || limit_reached {
                    state = WorkerState::ShuttingDown;
                }
            }
            tracing::trace!(state = state.name(), "worker state");

            state = match state {
                WorkerState::Idle => WorkerState::Selecting,

                WorkerState::Selecting => match self.select().await {
                    Ok(Some(plan)) => WorkerState::Executing(plan),
                    Ok(None) => {
                        stats.empty_pool_waits += 1;
                        self.backoff(&mut shutdown).await;
                        WorkerState::Selecting
                    }
                    Err(err) => {
                        stats.storage_failures += 1;
                        tracing::error!(error = %err, "failed to read roster");
                        self.backoff(&mut shutdown).await;
                        WorkerState::Selecting
                    }
                },

                WorkerState::Executing(plan) => {
                    let record = self.executor.execute(plan).await;
                    executed += 1;
                    WorkerState::Processing(record)
                }

                WorkerState::Processing(record) => {
                    let match_id = record.id;
                    match self.processor.process(record).await {
                        Ok(Processed::Recorded { .. }) => {
                            stats.recorded += 1;
                            WorkerState::Idle
                        }
                        Ok(Processed::Voided { .. }) => {
                            stats.voided += 1;
                            WorkerState::Selecting
                        }
                        Err(err) => {
                            stats.storage_failures += 1;
                            tracing::error!(%match_id, error = %err, "failed to record match");
                            self.backoff(&mut shutdown).await;
                            WorkerState::Selecting
                        }
                    }
                }

                WorkerState::ShuttingDown => break,
            };
        }

        tracing::info!(
            recorded = stats.recorded,
            voided = stats.voided,
            storage_failures = stats.storage_failures,
            empty_pool_waits = stats.empty_pool_waits,
            "worker stopped"
        );
        stats
    }

    /// Plan the next match, or `None` when the pool is too small.
    async fn select(&mut self) -> Result<Option<MatchPlan>, ProcessError> {
        let store = Arc::clone(self.processor.store());
        let roster = tokio::task::spawn_blocking(move || store.enabled_roster()).await??;

        let bots = match select_participants(&roster, &self.options.size, &mut self.rng) {
            Ok(bots) => bots,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    backoff_secs = self.options.backoff.as_secs(),
                    "cannot start a match"
                );
                return Ok(None);
            }
        };

        let map_size = self
            .options
            .map_sizes
            .choose(&mut self.rng)
            .map(|&size| (size, size));
        let participants: Vec<String> = bots.into_iter().map(|b| b.name).collect();
        tracing::debug!(?participants, ?map_size, "selected match");
        Ok(Some(MatchPlan {
            participants,
            map_size,
        }))
    }

    /// Sleep for the backoff interval, waking early on shutdown.
    async fn backoff(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.options.backoff) => {}
            _ = shutdown_requested(shutdown) => {}
        }
    }
}

/// Resolves once the flag is set. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod worker_tests;
