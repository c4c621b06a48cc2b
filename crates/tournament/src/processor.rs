//! Result processor: turns an executed match into rating updates
//!
//! Voided matches are dropped here without touching the store. Everything
//! else goes through [`Store::record_match`], so the counter increments,
//! rating updates and match row land together or not at all.

use arena_core::{Bot, MatchRecord, MatchStatus, RatingModel, Standing};
use arena_runner::discard_artifacts;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("match {0} is not pending")]
    NotPending(Uuid),

    #[error("processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What happened to a match handed to the processor.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// Ratings applied; `bots` are the participants after the update,
    /// aligned with `record.ranking`
    Recorded { record: MatchRecord, bots: Vec<Bot> },
    /// Simulator failure; nothing was written
    Voided { match_id: Uuid, reason: String },
}

pub struct ResultProcessor<S> {
    store: Arc<S>,
    model: RatingModel,
}

impl<S: Store + 'static> ResultProcessor<S> {
    pub fn new(store: Arc<S>, model: RatingModel) -> Self {
        Self { store, model }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn process(&self, record: MatchRecord) -> Result<Processed, ProcessError> {
        match record.status {
            MatchStatus::Voided => {
                discard_artifacts(&record.artifacts());
                let reason = record.error.unwrap_or_else(|| "simulator error".to_string());
                tracing::info!(match_id = %record.id, %reason, "discarding voided match");
                return Ok(Processed::Voided {
                    match_id: record.id,
                    reason,
                });
            }
            MatchStatus::Finalized => return Err(ProcessError::NotPending(record.id)),
            MatchStatus::Pending => {}
        }

        let store = Arc::clone(&self.store);
        let model = self.model;
        let (mut record, result) = tokio::task::spawn_blocking(move || {
            let result = store.record_match(&record, &|bots: &[Bot]| {
                let standings: Vec<Standing> = record
                    .ranking
                    .iter()
                    .zip(bots)
                    .map(|(placement, bot)| Standing {
                        rating: bot.rating(),
                        rank: placement.reported_rank,
                        outcome: placement.outcome,
                    })
                    .collect();
                model.update(&standings)
            });
            (record, result)
        })
        .await?;

        let bots = match result {
            Ok(bots) => bots,
            Err(err) => {
                // Nothing refers to the artifacts once the match is lost
                discard_artifacts(&record.artifacts());
                return Err(err.into());
            }
        };

        record.status = MatchStatus::Finalized;
        for bot in &bots {
            tracing::debug!(
                match_id = %record.id,
                bot = %bot.name,
                mu = bot.mu,
                sigma = bot.sigma,
                matches_played = bot.matches_played,
                "rating updated"
            );
        }
        tracing::info!(
            match_id = %record.id,
            ranking = ?bots.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            "match recorded"
        );
        Ok(Processed::Recorded { record, bots })
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod processor_tests;
