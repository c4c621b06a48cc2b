//! Weighted-random pairing of bots into matches
//!
//! Selection is a pure function of the roster and an explicit random source,
//! so callers can inject a seeded RNG and assert exact pairings.

use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;

use crate::error::MatchmakingError;
use crate::model::Bot;

/// Smallest match that makes sense
pub const MIN_PARTICIPANTS: usize = 2;

/// How many participants each match gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSize {
    /// Always exactly this many
    Fixed(usize),
    /// One of these per match, drawn uniformly. Clamped down to the pool
    /// size as long as the pool still holds the smallest choice.
    Choice(Vec<usize>),
}

impl MatchSize {
    pub fn validate(&self) -> Result<(), MatchmakingError> {
        let sizes: &[usize] = match self {
            MatchSize::Fixed(n) => std::slice::from_ref(n),
            MatchSize::Choice(choices) if choices.is_empty() => {
                return Err(MatchmakingError::InvalidMatchSize(0));
            }
            MatchSize::Choice(choices) => choices,
        };
        match sizes.iter().find(|&&n| n < MIN_PARTICIPANTS) {
            Some(&n) => Err(MatchmakingError::InvalidMatchSize(n)),
            None => Ok(()),
        }
    }

    /// Smallest pool that can still produce a match
    pub fn minimum(&self) -> usize {
        match self {
            MatchSize::Fixed(n) => *n,
            MatchSize::Choice(choices) => choices.iter().copied().min().unwrap_or(MIN_PARTICIPANTS),
        }
    }

    fn draw<R: Rng + ?Sized>(&self, pool: usize, rng: &mut R) -> usize {
        match self {
            MatchSize::Fixed(n) => *n,
            MatchSize::Choice(choices) => {
                let drawn = choices.choose(rng).copied().unwrap_or(MIN_PARTICIPANTS);
                drawn.min(pool)
            }
        }
    }
}

/// Pick participants for the next match.
///
/// Returns the chosen bots in player-slot order. Disabled bots in `roster`
/// are ignored. Fails with [`MatchmakingError::InsufficientPool`] rather than
/// returning a short list.
pub fn select_participants<R: Rng + ?Sized>(
    roster: &[Bot],
    size: &MatchSize,
    rng: &mut R,
) -> Result<Vec<Bot>, MatchmakingError> {
    size.validate()?;

    let pool: Vec<&Bot> = roster.iter().filter(|b| b.enabled).collect();
    let required = size.minimum();
    if pool.len() < required {
        return Err(MatchmakingError::InsufficientPool {
            available: pool.len(),
            required,
        });
    }
    let n = size.draw(pool.len(), rng);

    let seed_index = pick_seed(&pool, rng);
    let seed = pool[seed_index];

    let mut rest: Vec<(f64, &Bot)> = pool
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != seed_index)
        .map(|(_, &bot)| (rng.gen::<f64>() * (seed.mu - bot.mu).abs(), bot))
        .collect();
    // Stable sort: equal weights keep roster order
    rest.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut chosen: Vec<Bot> = std::iter::once(seed)
        .chain(rest.into_iter().take(n - 1).map(|(_, bot)| bot))
        .cloned()
        .collect();
    chosen.shuffle(rng);
    Ok(chosen)
}

/// Index (into `pool`) of the seed bot.
///
/// Weight is `uniform(0,1) * matches_played^2`; the smallest wins. Several
/// bots can share the exact minimum (most commonly two fresh bots, both at
/// zero); the seed is then drawn uniformly among them.
fn pick_seed<R: Rng + ?Sized>(pool: &[&Bot], rng: &mut R) -> usize {
    let weights: Vec<f64> = pool
        .iter()
        .map(|bot| {
            let played = bot.matches_played as f64;
            rng.gen::<f64>() * played * played
        })
        .collect();

    let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let tied: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] == min).collect();
    match tied.as_slice() {
        [only] => *only,
        _ => tied.choose(rng).copied().unwrap_or(0),
    }
}

#[cfg(test)]
#[path = "matchmaker_tests.rs"]
mod matchmaker_tests;
