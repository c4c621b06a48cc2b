//! Process-local store, for tests and single-process embedding

use arena_core::{Bot, MatchRecord, MatchStatus, Rating};
use std::sync::{Mutex, MutexGuard};

use super::{check_ratings, check_recordable, RateFn, Store, StoreError};

#[derive(Debug, Default)]
struct State {
    /// Registration order doubles as roster order
    bots: Vec<Bot>,
    matches: Vec<MatchRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with bots as given
    pub fn with_bots(bots: impl IntoIterator<Item = Bot>) -> Self {
        Self {
            state: Mutex::new(State {
                bots: bots.into_iter().collect(),
                matches: Vec::new(),
            }),
        }
    }

    /// Recorded matches, oldest first
    pub fn matches(&self) -> Result<Vec<MatchRecord>, StoreError> {
        Ok(self.lock()?.matches.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn register_bot(&self, name: &str, rating: Rating, enabled: bool) -> Result<Bot, StoreError> {
        arena_runner::validate_bot_name(name)?;
        let mut state = self.lock()?;
        if state.bots.iter().any(|b| b.name == name) {
            return Err(StoreError::DuplicateBot(name.to_string()));
        }
        let bot = Bot {
            enabled,
            ..Bot::new(name, rating)
        };
        state.bots.push(bot.clone());
        Ok(bot)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let bot = state
            .bots
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| StoreError::UnknownBot(name.to_string()))?;
        bot.enabled = enabled;
        Ok(())
    }

    fn bot(&self, name: &str) -> Result<Option<Bot>, StoreError> {
        Ok(self.lock()?.bots.iter().find(|b| b.name == name).cloned())
    }

    fn all_bots(&self) -> Result<Vec<Bot>, StoreError> {
        Ok(self.lock()?.bots.clone())
    }

    fn record_match(&self, record: &MatchRecord, rate: &RateFn<'_>) -> Result<Vec<Bot>, StoreError> {
        check_recordable(record)?;
        // Holding the lock for the whole read-modify-write is the transaction
        let mut state = self.lock()?;
        if state.matches.iter().any(|m| m.id == record.id) {
            return Err(StoreError::DuplicateMatch(record.id));
        }

        let indices = record
            .ranking
            .iter()
            .map(|p| {
                state
                    .bots
                    .iter()
                    .position(|b| b.name == p.bot)
                    .ok_or_else(|| StoreError::UnknownBot(p.bot.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let current: Vec<Bot> = indices.iter().map(|&i| state.bots[i].clone()).collect();

        let ratings = rate(current.as_slice());
        check_ratings(record, &ratings)?;

        let mut updated = Vec::with_capacity(indices.len());
        for (&i, rating) in indices.iter().zip(ratings) {
            let bot = &mut state.bots[i];
            bot.mu = rating.mu;
            bot.sigma = rating.sigma;
            bot.matches_played += 1;
            updated.push(bot.clone());
        }

        let mut finalized = record.clone();
        finalized.status = MatchStatus::Finalized;
        state.matches.push(finalized);
        Ok(updated)
    }

    fn match_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.matches.len() as u64)
    }
}
