//! Bot roster entries and match records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::rating::Rating;

/// A registered competitor.
///
/// The name doubles as the directory (under the configured bot root) that
/// holds the bot's executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub name: String,
    pub enabled: bool,
    pub mu: f64,
    pub sigma: f64,
    pub matches_played: u64,
}

impl Bot {
    pub fn new(name: impl Into<String>, rating: Rating) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            mu: rating.mu,
            sigma: rating.sigma,
            matches_played: 0,
        }
    }

    pub fn rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma)
    }

    /// Conservative skill estimate used for standings
    pub fn score(&self) -> f64 {
        self.rating().conservative()
    }
}

/// Per-participant outcome tag reported for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Finished,
    Crashed,
    TimedOut,
    /// The whole match was voided
    SimulatorError,
}

impl Outcome {
    /// Whether this participant failed during an otherwise valid match.
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Crashed | Outcome::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Finished => "finished",
            Outcome::Crashed => "crashed",
            Outcome::TimedOut => "timed_out",
            Outcome::SimulatorError => "simulator_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "finished" => Some(Outcome::Finished),
            "crashed" => Some(Outcome::Crashed),
            "timed_out" => Some(Outcome::TimedOut),
            "simulator_error" => Some(Outcome::SimulatorError),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a match record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Spawned, or executed and waiting for the result processor
    Pending,
    /// Ratings applied and record persisted; immutable from here on
    Finalized,
    /// Simulator failure; discarded without side effects
    Voided,
}

/// One participant's line in a match result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub bot: String,
    /// Player slot the simulator assigned (0-based, participant order)
    pub slot: usize,
    /// Rank as reported by the simulator (1 = best). Equal ranks are draws.
    pub reported_rank: u32,
    pub outcome: Outcome,
    pub last_frame_alive: Option<u32>,
    pub error_log: Option<PathBuf>,
}

/// Sort placements best to worst.
///
/// Failed participants always land below every participant that finished;
/// within each group the simulator's rank decides, then slot order.
pub fn rank_placements(placements: &mut [Placement]) {
    placements.sort_by(compare_placements);
}

fn compare_placements(a: &Placement, b: &Placement) -> Ordering {
    a.outcome
        .is_failure()
        .cmp(&b.outcome.is_failure())
        .then(a.reported_rank.cmp(&b.reported_rank))
        .then(a.slot.cmp(&b.slot))
}

/// One simulation, from spawn to finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    /// Participants in player-slot order
    pub participants: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub status: MatchStatus,
    /// Final ranking, best first. Voided matches list every participant as
    /// `simulator_error`.
    pub ranking: Vec<Placement>,
    pub replay: Option<PathBuf>,
    pub seed: Option<String>,
    pub map_size: Option<(u32, u32)>,
    /// Why the match was voided
    pub error: Option<String>,
}

impl MatchRecord {
    /// A freshly spawned match.
    pub fn pending(participants: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            participants,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            status: MatchStatus::Pending,
            ranking: Vec::new(),
            replay: None,
            seed: None,
            map_size: None,
            error: None,
        }
    }

    /// Mark the match as a simulator failure. Every participant is tagged
    /// `simulator_error` and any ranking is dropped.
    pub fn void(&mut self, reason: impl Into<String>) {
        self.status = MatchStatus::Voided;
        self.error = Some(reason.into());
        self.ranking = self
            .participants
            .iter()
            .enumerate()
            .map(|(slot, bot)| Placement {
                bot: bot.clone(),
                slot,
                reported_rank: 0,
                outcome: Outcome::SimulatorError,
                last_frame_alive: None,
                error_log: None,
            })
            .collect();
    }

    pub fn is_voided(&self) -> bool {
        self.status == MatchStatus::Voided
    }

    /// Outcome tag for a participant, if present in the ranking.
    pub fn outcome_of(&self, bot: &str) -> Option<Outcome> {
        self.ranking.iter().find(|p| p.bot == bot).map(|p| p.outcome)
    }

    /// Every artifact path this record points at.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.replay
            .iter()
            .cloned()
            .chain(self.ranking.iter().filter_map(|p| p.error_log.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
