//! Errors raised by the pure arena components

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchmakingError {
    /// Not enough enabled bots; the caller should back off and retry
    #[error("insufficient pool: {available} enabled bots, need {required}")]
    InsufficientPool { available: usize, required: usize },

    #[error("invalid match size {0}: a match needs at least two participants")]
    InvalidMatchSize(usize),
}
