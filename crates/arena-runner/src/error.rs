//! Errors surfaced while preparing or interpreting a match

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("cannot resolve executor path: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid bot name '{0}': must be a single path component without whitespace")]
    InvalidBotName(String),

    #[error("launch template '{0}' must contain the {{dir}} placeholder")]
    MissingDirPlaceholder(String),

    #[error("unknown placeholder {{{placeholder}}} in '{template}'")]
    UnknownPlaceholder { template: String, placeholder: String },

    #[error("unterminated placeholder in '{0}'")]
    Unterminated(String),
}

/// A result file that does not match the expected schema.
#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("failed to read result file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed result file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("result lists {found} players, match has {expected}")]
    PlayerCount { expected: usize, found: usize },

    #[error("player slot {slot} out of range for {players} players")]
    SlotOutOfRange { slot: usize, players: usize },

    #[error("player slot {0} reported twice")]
    DuplicateSlot(usize),

    #[error("player slot {0} has rank 0; ranks start at 1")]
    ZeroRank(usize),

    #[error("result reports only one of width and height")]
    PartialMapSize,

    #[error("result path '{}' must be relative and stay inside the match directory", .0.display())]
    UnsafePath(PathBuf),
}
