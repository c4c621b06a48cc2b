//! Strict parsing of the simulator's result file
//!
//! Any deviation from the schema is a [`VerdictError`]; the executor turns
//! that into a voided match instead of guessing.

use arena_core::Outcome;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

use crate::error::VerdictError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResultFile {
    players: Vec<PlayerLine>,
    #[serde(default)]
    replay: Option<PathBuf>,
    #[serde(default)]
    seed: Option<SeedValue>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlayerLine {
    slot: usize,
    rank: u32,
    status: PlayerStatus,
    #[serde(default)]
    last_frame_alive: Option<u32>,
    #[serde(default)]
    log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PlayerStatus {
    Finished,
    Crashed,
    TimedOut,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedValue {
    Number(u64),
    Text(String),
}

/// One player's line from a validated result file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerVerdict {
    pub slot: usize,
    pub rank: u32,
    pub outcome: Outcome,
    pub last_frame_alive: Option<u32>,
    /// Log the simulator kept for this player, if any
    pub log: Option<PathBuf>,
}

/// A validated simulator result.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Exactly one entry per participant, sorted by slot
    pub players: Vec<PlayerVerdict>,
    pub replay: Option<PathBuf>,
    pub seed: Option<String>,
    pub map_size: Option<(u32, u32)>,
}

/// Validate a result document for a match with `participants` players.
pub fn parse_verdict(contents: &[u8], participants: usize) -> Result<Verdict, VerdictError> {
    let file: ResultFile = serde_json::from_slice(contents)?;

    if file.players.len() != participants {
        return Err(VerdictError::PlayerCount {
            expected: participants,
            found: file.players.len(),
        });
    }

    let mut seen = vec![false; participants];
    for line in &file.players {
        if line.slot >= participants {
            return Err(VerdictError::SlotOutOfRange {
                slot: line.slot,
                players: participants,
            });
        }
        if std::mem::replace(&mut seen[line.slot], true) {
            return Err(VerdictError::DuplicateSlot(line.slot));
        }
        if line.rank == 0 {
            return Err(VerdictError::ZeroRank(line.slot));
        }
        if let Some(log) = &line.log {
            check_contained(log)?;
        }
    }
    if let Some(replay) = &file.replay {
        check_contained(replay)?;
    }

    let map_size = match (file.width, file.height) {
        (Some(w), Some(h)) => Some((w, h)),
        (None, None) => None,
        _ => return Err(VerdictError::PartialMapSize),
    };

    let mut players: Vec<PlayerVerdict> = file
        .players
        .into_iter()
        .map(|line| PlayerVerdict {
            slot: line.slot,
            rank: line.rank,
            outcome: match line.status {
                PlayerStatus::Finished => Outcome::Finished,
                PlayerStatus::Crashed => Outcome::Crashed,
                PlayerStatus::TimedOut => Outcome::TimedOut,
            },
            last_frame_alive: line.last_frame_alive,
            log: line.log,
        })
        .collect();
    players.sort_by_key(|p| p.slot);

    Ok(Verdict {
        players,
        replay: file.replay,
        seed: file.seed.map(|s| match s {
            SeedValue::Number(n) => n.to_string(),
            SeedValue::Text(t) => t,
        }),
        map_size,
    })
}

/// Paths in the result file are joined onto the match's scratch directory,
/// and the replay is deleted after compression. Only plain relative paths
/// are accepted.
fn check_contained(path: &Path) -> Result<(), VerdictError> {
    let contained = path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(VerdictError::UnsafePath(path.to_path_buf()));
    }
    Ok(())
}

/// Read and validate the result file the simulator wrote.
pub async fn read_verdict(path: &Path, participants: usize) -> Result<Verdict, VerdictError> {
    let contents = tokio::fs::read(path).await.map_err(|source| VerdictError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_verdict(&contents, participants)
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod verdict_tests;
