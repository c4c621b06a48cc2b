//! Arena core for the bot tournament worker
//!
//! This crate holds the pure parts of the worker:
//! - The bot roster and match record types
//! - Weighted-random matchmaking
//! - Bayesian skill ratings over full match rankings
//!
//! Nothing here performs I/O. Process supervision lives in `arena-runner`,
//! persistence and the worker loop in `tournament`.

mod error;
mod matchmaker;
mod model;
mod rating;

pub use error::*;
pub use matchmaker::*;
pub use model::*;
pub use rating::*;
