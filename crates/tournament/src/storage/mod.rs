//! Persistence of bots and match records
//!
//! The worker only needs a handful of operations; everything else about the
//! backing store is hidden behind [`Store`]. The one write that matters for
//! correctness is [`Store::record_match`], which must read, rate and write
//! all participants in a single atomic step so that concurrent workers never
//! lose an update.

use arena_core::{Bot, MatchRecord, Rating};
use thiserror::Error;

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown bot '{0}'")]
    UnknownBot(String),

    #[error("bot '{0}' already exists")]
    DuplicateBot(String),

    #[error("invalid bot name: {0}")]
    InvalidBotName(#[from] arena_runner::TemplateError),

    #[error("match {0} was already recorded")]
    DuplicateMatch(uuid::Uuid),

    #[error("inconsistent match record: {0}")]
    Inconsistent(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Computes new ratings for the participants of a match.
///
/// Receives the participants as currently stored, aligned with the match's
/// ranking, and returns one rating per participant in the same order.
pub type RateFn<'a> = dyn Fn(&[Bot]) -> Vec<Rating> + 'a;

pub trait Store: Send + Sync {
    /// Add a new bot with the given starting rating.
    fn register_bot(&self, name: &str, rating: Rating, enabled: bool) -> Result<Bot, StoreError>;

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError>;

    fn bot(&self, name: &str) -> Result<Option<Bot>, StoreError>;

    /// Every bot, enabled or not, in registration order
    fn all_bots(&self) -> Result<Vec<Bot>, StoreError>;

    /// Enabled bots in registration order
    fn enabled_roster(&self) -> Result<Vec<Bot>, StoreError> {
        Ok(self.all_bots()?.into_iter().filter(|b| b.enabled).collect())
    }

    /// Finalize a match in one transaction.
    ///
    /// Re-reads every participant, applies `rate`, increments each
    /// participant's `matches_played` by one and stores the match with its
    /// per-participant results. Either all of it happens or none of it.
    /// Returns the updated bots aligned with `record.ranking`.
    fn record_match(&self, record: &MatchRecord, rate: &RateFn<'_>) -> Result<Vec<Bot>, StoreError>;

    fn match_count(&self) -> Result<u64, StoreError>;
}

/// Checks shared by every implementation before a match is written.
fn check_recordable(record: &MatchRecord) -> Result<(), StoreError> {
    if record.status != arena_core::MatchStatus::Pending {
        return Err(StoreError::Inconsistent(format!(
            "match {} is {:?}, only pending matches can be recorded",
            record.id, record.status
        )));
    }
    if record.ranking.len() != record.participants.len() {
        return Err(StoreError::Inconsistent(format!(
            "match {} ranks {} of {} participants",
            record.id,
            record.ranking.len(),
            record.participants.len()
        )));
    }
    Ok(())
}

fn check_ratings(record: &MatchRecord, ratings: &[Rating]) -> Result<(), StoreError> {
    if ratings.len() != record.ranking.len() {
        return Err(StoreError::Inconsistent(format!(
            "rating update returned {} ratings for {} participants",
            ratings.len(),
            record.ranking.len()
        )));
    }
    Ok(())
}
