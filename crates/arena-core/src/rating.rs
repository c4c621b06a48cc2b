//! Bayesian skill rating over full match rankings
//!
//! Each bot carries a Gaussian belief about its skill (`mu`, `sigma`). A match
//! result updates every participant against every other participant, so the
//! whole ranking matters and not only adjacent pairs. The update follows the
//! Thurstone-Mosteller full-pairing model of Weng & Lin, which uses the same
//! truncated-Gaussian correction functions as TrueSkill.

use serde::{Deserialize, Serialize};

use crate::model::Outcome;

/// Default mean for new bots
pub const DEFAULT_MU: f64 = 25.0;

/// Default uncertainty for new bots
pub const DEFAULT_SIGMA: f64 = DEFAULT_MU / 3.0;

/// Performance noise; skill gap of one `beta` is roughly a 76% win chance
pub const DEFAULT_BETA: f64 = DEFAULT_MU / 6.0;

/// Lower bound on the variance shrink factor, keeps `sigma` positive
pub const DEFAULT_KAPPA: f64 = 0.0001;

/// Performance gap below which two equal ranks count as a draw
pub const DEFAULT_DRAW_MARGIN: f64 = 0.1;

/// Skill estimate of one bot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mu: f64,
    pub sigma: f64,
}

impl Rating {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    /// `mu - 3 * sigma`: a lower bound the bot very likely exceeds
    pub fn conservative(&self) -> f64 {
        self.mu - 3.0 * self.sigma
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self::new(DEFAULT_MU, DEFAULT_SIGMA)
    }
}

/// One participant's line as fed to the rating update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing {
    pub rating: Rating,
    /// Simulator rank, 1 = best. Equal ranks among finishers are draws.
    pub rank: u32,
    pub outcome: Outcome,
}

/// Rating update parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingModel {
    pub beta: f64,
    pub kappa: f64,
    pub draw_margin: f64,
}

impl Default for RatingModel {
    fn default() -> Self {
        Self {
            beta: DEFAULT_BETA,
            kappa: DEFAULT_KAPPA,
            draw_margin: DEFAULT_DRAW_MARGIN,
        }
    }
}

impl RatingModel {
    /// Compute new ratings for every participant of a match.
    ///
    /// The returned vector is aligned with `standings`. Crashed and timed-out
    /// participants are placed below every finisher regardless of the rank the
    /// simulator gave them. Pure and deterministic.
    pub fn update(&self, standings: &[Standing]) -> Vec<Rating> {
        let positions = effective_positions(standings);
        let two_beta_sq = 2.0 * self.beta * self.beta;

        standings
            .iter()
            .enumerate()
            .map(|(i, me)| {
                let sigma_sq = me.rating.sigma * me.rating.sigma;
                let mut omega = 0.0;
                let mut delta = 0.0;

                for (q, other) in standings.iter().enumerate() {
                    if q == i {
                        continue;
                    }
                    let c = (sigma_sq + other.rating.sigma * other.rating.sigma + two_beta_sq).sqrt();
                    let gap = (me.rating.mu - other.rating.mu) / c;
                    let margin = self.draw_margin / c;
                    let sigma_sq_over_c = sigma_sq / c;
                    let gamma = me.rating.sigma / c;

                    let (v, w) = match positions[i].cmp(&positions[q]) {
                        std::cmp::Ordering::Less => (v_win(gap, margin), w_win(gap, margin)),
                        std::cmp::Ordering::Greater => {
                            (-v_win(-gap, margin), w_win(-gap, margin))
                        }
                        std::cmp::Ordering::Equal => (v_draw(gap, margin), w_draw(gap, margin)),
                    };

                    omega += sigma_sq_over_c * v;
                    delta += gamma * sigma_sq_over_c / c * w;
                }

                Rating {
                    mu: me.rating.mu + omega,
                    sigma: me.rating.sigma * (1.0 - delta).max(self.kappa).sqrt(),
                }
            })
            .collect()
    }
}

/// Rank position used for pairwise comparison; lower is better.
///
/// Finishers keep their reported rank. Failed participants are pushed past
/// the worst finisher and ordered among themselves by reported rank then slot,
/// so no two failed participants draw with each other.
fn effective_positions(standings: &[Standing]) -> Vec<u64> {
    let worst_finisher = standings
        .iter()
        .filter(|s| !s.outcome.is_failure())
        .map(|s| u64::from(s.rank))
        .max()
        .unwrap_or(0);

    let mut failed: Vec<usize> = (0..standings.len())
        .filter(|&i| standings[i].outcome.is_failure())
        .collect();
    failed.sort_by_key(|&i| (standings[i].rank, i));

    let mut positions: Vec<u64> = standings.iter().map(|s| u64::from(s.rank)).collect();
    for (offset, &i) in failed.iter().enumerate() {
        positions[i] = worst_finisher + 1 + offset as u64;
    }
    positions
}

/// Mean correction for a win by `x` with draw margin `t`
fn v_win(x: f64, t: f64) -> f64 {
    let xt = x - t;
    let denom = normal_cdf(xt);
    if denom < f64::EPSILON {
        return -xt;
    }
    normal_pdf(xt) / denom
}

/// Variance correction for a win by `x` with draw margin `t`
fn w_win(x: f64, t: f64) -> f64 {
    let xt = x - t;
    let denom = normal_cdf(xt);
    if denom < f64::EPSILON {
        return if x < 0.0 { 1.0 } else { 0.0 };
    }
    let v = v_win(x, t);
    v * (v + xt)
}

/// Mean correction for a draw
fn v_draw(x: f64, t: f64) -> f64 {
    let xx = x.abs();
    let b = normal_cdf(t - xx) - normal_cdf(-t - xx);
    if b < 1e-5 {
        return if x < 0.0 { -x - t } else { -x + t };
    }
    let a = normal_pdf(-t - xx) - normal_pdf(t - xx);
    if x < 0.0 {
        -a / b
    } else {
        a / b
    }
}

/// Variance correction for a draw
fn w_draw(x: f64, t: f64) -> f64 {
    let xx = x.abs();
    let b = normal_cdf(t - xx) - normal_cdf(-t - xx);
    if b < f64::EPSILON {
        return 1.0;
    }
    let v = v_draw(x, t);
    ((t - xx) * normal_pdf(t - xx) + (t + xx) * normal_pdf(-t - xx)) / b + v * v
}

fn normal_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Complementary error function (Chebyshev fit, relative error < 1.2e-7)
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

#[cfg(test)]
#[path = "rating_tests.rs"]
mod rating_tests;
