//! Tournament worker
//!
//! This crate ties the arena crates together into a long-running worker:
//! - Configuration loading and validation
//! - Storage of bots and matches (SQLite, or in memory for tests)
//! - The result processor that applies rating updates atomically
//! - The worker loop state machine and its shutdown handling
//!
//! # Usage
//!
//! ```bash
//! # Register bots, one directory per bot under the bot root
//! tournament --config worker.toml add-bot alice
//! tournament --config worker.toml add-bot bob
//!
//! # Play matches until SIGTERM
//! tournament --config worker.toml run
//!
//! # Standings by conservative score
//! tournament --config worker.toml leaderboard
//! ```

pub mod config;
pub mod processor;
pub mod shutdown;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, Config};
pub use processor::{ProcessError, Processed, ResultProcessor};
pub use storage::{MemoryStore, SqliteStore, Store, StoreError};
pub use worker::{Worker, WorkerOptions, WorkerState, WorkerStats};
