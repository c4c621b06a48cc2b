//! Match execution for the arena worker
//!
//! This crate runs one match end to end:
//! - Resolves each bot's launch command from its directory
//! - Spawns the external simulator in its own process group
//! - Enforces a wall-clock ceiling and always reaps the whole group
//! - Validates the simulator's result file against a strict schema
//! - Compresses the replay and archives error logs of failing bots
//!
//! Every failure of the simulator itself degrades to a voided match; the
//! executor never returns an error to its caller.

mod archive;
mod error;
mod executor;
mod supervisor;
mod template;
mod verdict;

pub use archive::*;
pub use error::*;
pub use executor::*;
pub use supervisor::*;
pub use template::*;
pub use verdict::*;
