//! Worker configuration, loaded from a TOML file

use anyhow::{bail, Context, Result};
use arena_core::{MatchSize, Rating, RatingModel, DEFAULT_BETA, DEFAULT_DRAW_MARGIN, DEFAULT_KAPPA};
use arena_runner::{
    placeholders, substitute, LaunchTemplate, SimulatorConfig, BOT_ARG_KEYS, SIMULATOR_KEYS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub simulator: SimulatorConfig,
    pub matchmaking: MatchmakingConfig,
    pub rating: RatingConfig,
}

/// Filesystem locations, relative to the working directory unless absolute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// One directory per bot, named after the bot
    pub bot_root: PathBuf,
    pub replay_root: PathBuf,
    pub error_log_root: PathBuf,
    /// Scratch space for simulator output; one subdirectory per match
    pub work_dir: PathBuf,
    pub database: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            bot_root: PathBuf::from("bots"),
            replay_root: PathBuf::from("replays"),
            error_log_root: PathBuf::from("error_logs"),
            work_dir: PathBuf::from("work"),
            database: PathBuf::from("tournament.db"),
        }
    }
}

const DEFAULT_PARTICIPANTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchmakingConfig {
    /// Participants per match, 2 when unset
    pub participants: Option<usize>,
    /// One of these sizes is drawn per match; excludes `participants`
    pub participant_choices: Option<Vec<usize>>,
    /// Sleep when the pool is too small, or after a storage failure
    pub backoff_secs: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            participants: None,
            participant_choices: None,
            backoff_secs: 30,
        }
    }
}

impl MatchmakingConfig {
    pub fn match_size(&self) -> MatchSize {
        match &self.participant_choices {
            Some(choices) => MatchSize::Choice(choices.clone()),
            None => MatchSize::Fixed(self.participants.unwrap_or(DEFAULT_PARTICIPANTS)),
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatingConfig {
    /// Starting skill for newly registered bots
    pub default_mu: f64,
    pub default_sigma: f64,
    pub beta: f64,
    pub kappa: f64,
    pub draw_margin: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        let rating = Rating::default();
        Self {
            default_mu: rating.mu,
            default_sigma: rating.sigma,
            beta: DEFAULT_BETA,
            kappa: DEFAULT_KAPPA,
            draw_margin: DEFAULT_DRAW_MARGIN,
        }
    }
}

impl RatingConfig {
    pub fn model(&self) -> RatingModel {
        RatingModel {
            beta: self.beta,
            kappa: self.kappa,
            draw_margin: self.draw_margin,
        }
    }

    pub fn default_rating(&self) -> Rating {
        Rating::new(self.default_mu, self.default_sigma)
    }
}

/// Read and parse a config file. Does not validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(config)
}

impl Config {
    /// Check the config for internal consistency.
    ///
    /// Anything that would otherwise only fail at the first match (bad
    /// placeholders, impossible sizes) is rejected here.
    pub fn validate(&self) -> Result<()> {
        if self.matchmaking.participants.is_some() && self.matchmaking.participant_choices.is_some() {
            bail!("matchmaking.participants and matchmaking.participant_choices are mutually exclusive");
        }
        self.matchmaking
            .match_size()
            .validate()
            .context("matchmaking.participants / participant_choices")?;
        if self.matchmaking.backoff_secs == 0 {
            bail!("matchmaking.backoff_secs must be at least 1");
        }

        let sim = &self.simulator;
        if sim.wall_clock_secs == 0 {
            bail!("simulator.wall_clock_secs must be positive");
        }
        LaunchTemplate::new(sim.launch_template.clone()).context("simulator.launch_template")?;
        check_placeholders("simulator.args", &sim.args, &SIMULATOR_KEYS)?;
        check_placeholders("simulator.bot_args", &sim.bot_args, &BOT_ARG_KEYS)?;

        let uses_dimensions = sim
            .args
            .iter()
            .flat_map(|arg| placeholders(arg))
            .any(|key| key == "width" || key == "height");
        if uses_dimensions && sim.map_sizes.is_empty() {
            bail!("simulator.args use {{width}}/{{height}} but simulator.map_sizes is empty");
        }
        if sim.map_sizes.contains(&0) {
            bail!("simulator.map_sizes must be positive");
        }

        let rating = &self.rating;
        if !rating.default_mu.is_finite() {
            bail!("rating.default_mu must be finite");
        }
        if !positive(rating.default_sigma) {
            bail!("rating.default_sigma must be positive, got {}", rating.default_sigma);
        }
        if !positive(rating.beta) {
            bail!("rating.beta must be positive, got {}", rating.beta);
        }
        if !positive(rating.kappa) || rating.kappa > 1.0 {
            bail!("rating.kappa must be in (0, 1], got {}", rating.kappa);
        }
        if !rating.draw_margin.is_finite() || rating.draw_margin < 0.0 {
            bail!("rating.draw_margin must not be negative, got {}", rating.draw_margin);
        }
        Ok(())
    }
}

fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// Dry-substitute every template so unknown or unterminated placeholders
/// fail at startup.
fn check_placeholders(key: &str, templates: &[String], allowed: &[&str]) -> Result<()> {
    let values: Vec<(&str, &str)> = allowed.iter().map(|k| (*k, "")).collect();
    for template in templates {
        substitute(template, &values).with_context(|| format!("{key}: '{template}'"))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
