//! Match executor: one simulator run from spawn to parsed ranking

use arena_core::{rank_placements, MatchRecord, Placement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use uuid::Uuid;

use crate::archive::ArtifactStore;
use crate::error::{ExecutorError, TemplateError};
use crate::supervisor::{supervise, Exit, Supervised};
use crate::template::{substitute, LaunchTemplate};
use crate::verdict::{read_verdict, PlayerVerdict, Verdict};

/// Placeholders accepted in [`SimulatorConfig::args`]
pub const SIMULATOR_KEYS: [&str; 5] = ["result", "replay", "width", "height", "workdir"];

/// Placeholders accepted in [`SimulatorConfig::bot_args`]
pub const BOT_ARG_KEYS: [&str; 3] = ["command", "name", "slot"];

const RESULT_FILE: &str = "result.json";
const REPLAY_FILE: &str = "replay.hlt";

/// How to invoke the external simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Simulator executable
    pub executable: PathBuf,
    /// Arguments before the bot list
    pub args: Vec<String>,
    /// Arguments appended once per bot, in slot order
    pub bot_args: Vec<String>,
    /// Command line for one bot; see [`LaunchTemplate`]
    pub launch_template: String,
    /// Hard ceiling for a whole match
    pub wall_clock_secs: u64,
    /// Time allowed for killing and reaping after the ceiling
    pub cleanup_grace_secs: u64,
    /// Map sizes to draw from, one per match
    pub map_sizes: Vec<u32>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("./simulator"),
            args: vec![
                "--results".to_string(),
                "{result}".to_string(),
                "--replay".to_string(),
                "{replay}".to_string(),
            ],
            bot_args: vec!["{command}".to_string(), "{name}".to_string()],
            launch_template: "{dir}/MyBot".to_string(),
            wall_clock_secs: 600,
            cleanup_grace_secs: 5,
            map_sizes: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.wall_clock_secs)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }
}

/// What to run: participants in slot order plus the drawn map size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    pub participants: Vec<String>,
    pub map_size: Option<(u32, u32)>,
}

/// Runs a planned match to a [`MatchRecord`].
///
/// The returned record is either `Pending` with a full ranking, or `Voided`.
/// Implementations never fail and never block past their own deadline.
#[async_trait]
pub trait MatchExecutor: Send + Sync {
    async fn execute(&self, plan: MatchPlan) -> MatchRecord;
}

/// Executes matches by spawning the configured simulator.
///
/// The simulator runs with its per-match scratch directory as working
/// directory, so every path it is handed is made absolute up front.
#[derive(Debug, Clone)]
pub struct SimulatorExecutor {
    config: SimulatorConfig,
    launch: LaunchTemplate,
    bot_root: PathBuf,
    work_dir: PathBuf,
    artifacts: ArtifactStore,
}

impl SimulatorExecutor {
    pub fn new(
        mut config: SimulatorConfig,
        bot_root: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        artifacts: ArtifactStore,
    ) -> Result<Self, ExecutorError> {
        let launch = LaunchTemplate::new(config.launch_template.clone())?;
        // A bare name like `sh` is a PATH lookup and stays as it is
        if config.executable.is_relative() && config.executable.components().count() > 1 {
            config.executable = std::path::absolute(&config.executable)?;
        }
        let artifacts = ArtifactStore::new(
            std::path::absolute(artifacts.replay_root())?,
            std::path::absolute(artifacts.error_log_root())?,
        );
        Ok(Self {
            config,
            launch,
            bot_root: std::path::absolute(bot_root.into())?,
            work_dir: std::path::absolute(work_dir.into())?,
            artifacts,
        })
    }

    /// Full simulator argument list for one match.
    fn build_args(&self, plan: &MatchPlan, scratch: &Path) -> Result<Vec<String>, TemplateError> {
        let result = scratch.join(RESULT_FILE).to_string_lossy().into_owned();
        let replay = scratch.join(REPLAY_FILE).to_string_lossy().into_owned();
        let workdir = scratch.to_string_lossy().into_owned();
        let (width, height) = plan
            .map_size
            .map(|(w, h)| (w.to_string(), h.to_string()))
            .unwrap_or_default();
        let values = [
            ("result", result.as_str()),
            ("replay", replay.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("workdir", workdir.as_str()),
        ];

        let mut args = self
            .config
            .args
            .iter()
            .map(|arg| substitute(arg, &values))
            .collect::<Result<Vec<_>, _>>()?;

        for (slot, name) in plan.participants.iter().enumerate() {
            let command = self.launch.resolve(&self.bot_root, name, &stderr_capture(scratch, slot))?;
            let slot = slot.to_string();
            let bot_values = [
                ("command", command.as_str()),
                ("name", name.as_str()),
                ("slot", slot.as_str()),
            ];
            for arg in &self.config.bot_args {
                args.push(substitute(arg, &bot_values)?);
            }
        }
        Ok(args)
    }

    /// Spawn, supervise and interpret. `Err` carries the reason to void.
    async fn run(&self, record: &mut MatchRecord, plan: &MatchPlan, scratch: &Path) -> Result<(), String> {
        let args = self
            .build_args(plan, scratch)
            .map_err(|err| format!("failed to build simulator command: {err}"))?;

        tracing::info!(
            match_id = %record.id,
            participants = ?record.participants,
            executable = %self.config.executable.display(),
            "spawning simulator"
        );

        let mut command = Command::new(&self.config.executable);
        command.args(&args).current_dir(scratch);

        let run = supervise(command, self.config.wall_clock(), self.config.cleanup_grace())
            .await
            .map_err(|err| {
                format!(
                    "failed to spawn simulator '{}': {err}",
                    self.config.executable.display()
                )
            })?;

        match run.exit {
            Exit::DeadlineExceeded => {
                return Err(format!(
                    "simulator exceeded wall-clock ceiling of {}s",
                    self.config.wall_clock_secs
                ));
            }
            Exit::Completed(status) if !status.success() => {
                return Err(format!(
                    "simulator exited with {status}: {}",
                    tail_line(&run.stderr_lossy())
                ));
            }
            Exit::Completed(_) => {}
        }

        let verdict = read_verdict(&scratch.join(RESULT_FILE), record.participants.len())
            .await
            .map_err(|err| err.to_string())?;

        self.archive(record, scratch, verdict, &run).await;
        Ok(())
    }

    /// Turn a validated verdict into the record's ranking and artifacts.
    async fn archive(&self, record: &mut MatchRecord, scratch: &Path, verdict: Verdict, run: &Supervised) {
        let mut ranking = Vec::with_capacity(verdict.players.len());
        for player in &verdict.players {
            let bot = record.participants[player.slot].clone();
            let error_log = if player.outcome.is_failure() {
                self.store_error_log(record.id, &bot, player, scratch, run).await
            } else {
                None
            };
            ranking.push(Placement {
                bot,
                slot: player.slot,
                reported_rank: player.rank,
                outcome: player.outcome,
                last_frame_alive: player.last_frame_alive,
                error_log,
            });
        }
        rank_placements(&mut ranking);

        let replay_source = verdict
            .replay
            .map(|path| scratch.join(path))
            .unwrap_or_else(|| scratch.join(REPLAY_FILE));
        record.replay = self.compress_replay(record.id, replay_source).await;
        record.ranking = ranking;
        record.seed = verdict.seed;
        if verdict.map_size.is_some() {
            record.map_size = verdict.map_size;
        }
    }

    async fn compress_replay(&self, match_id: Uuid, source: PathBuf) -> Option<PathBuf> {
        if !source.exists() {
            tracing::warn!(%match_id, path = %source.display(), "simulator produced no replay");
            return None;
        }
        let artifacts = self.artifacts.clone();
        let compressed =
            tokio::task::spawn_blocking(move || artifacts.compress_replay(&source, match_id)).await;
        match compressed {
            Ok(Ok(path)) => Some(path),
            Ok(Err(err)) => {
                tracing::warn!(%match_id, error = %err, "failed to compress replay");
                None
            }
            Err(err) => {
                tracing::warn!(%match_id, error = %err, "replay compression task failed");
                None
            }
        }
    }

    /// Persist a failing bot's output.
    ///
    /// Sources in order: the log the simulator reported, the bot's own stderr
    /// capture, and finally a note built from the simulator's stderr.
    async fn store_error_log(
        &self,
        match_id: Uuid,
        bot: &str,
        player: &PlayerVerdict,
        scratch: &Path,
        run: &Supervised,
    ) -> Option<PathBuf> {
        let mut contents = None;
        if let Some(log) = &player.log {
            contents = tokio::fs::read(scratch.join(log)).await.ok();
        }
        if contents.is_none() {
            contents = tokio::fs::read(stderr_capture(scratch, player.slot))
                .await
                .ok()
                .filter(|bytes| !bytes.is_empty());
        }
        let contents = contents.unwrap_or_else(|| {
            format!(
                "{bot} {} in slot {} (rank {})\n\nsimulator stderr:\n{}\n",
                player.outcome,
                player.slot,
                player.rank,
                run.stderr_lossy()
            )
            .into_bytes()
        });

        let artifacts = self.artifacts.clone();
        let name = bot.to_string();
        let stored =
            tokio::task::spawn_blocking(move || artifacts.store_error_log(match_id, &name, &contents)).await;
        match stored {
            Ok(Ok(path)) => Some(path),
            Ok(Err(err)) => {
                tracing::warn!(%match_id, bot, error = %err, "failed to store error log");
                None
            }
            Err(err) => {
                tracing::warn!(%match_id, bot, error = %err, "error log task failed");
                None
            }
        }
    }
}

#[async_trait]
impl MatchExecutor for SimulatorExecutor {
    async fn execute(&self, plan: MatchPlan) -> MatchRecord {
        let started = Instant::now();
        let mut record = MatchRecord::pending(plan.participants.clone());
        record.map_size = plan.map_size;

        let scratch = self.work_dir.join(record.id.to_string());
        let outcome = match tokio::fs::create_dir_all(&scratch).await {
            Ok(()) => self.run(&mut record, &plan, &scratch).await,
            Err(err) => Err(format!(
                "failed to create work directory {}: {err}",
                scratch.display()
            )),
        };
        record.duration = started.elapsed();

        if let Err(reason) = outcome {
            tracing::warn!(match_id = %record.id, %reason, "match voided");
            record.void(reason);
        } else {
            tracing::info!(
                match_id = %record.id,
                duration_ms = record.duration.as_millis() as u64,
                ranking = ?record.ranking.iter().map(|p| p.bot.as_str()).collect::<Vec<_>>(),
                "match completed"
            );
        }

        if let Err(err) = tokio::fs::remove_dir_all(&scratch).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %scratch.display(), error = %err, "failed to clean work directory");
            }
        }
        record
    }
}

fn stderr_capture(scratch: &Path, slot: usize) -> PathBuf {
    scratch.join(format!("{slot}.stderr"))
}

fn tail_line(text: &str) -> &str {
    text.lines().last().unwrap_or("")
}

#[cfg(all(test, unix))]
#[path = "executor_tests.rs"]
mod executor_tests;
