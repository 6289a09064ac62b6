//! Normal-distribution loss simulation.
//!
//! Each run draws `n` losses from `Normal(mean, stddev)` and reports the
//! sample minimum, maximum and mean rounded to cents, plus equal-width
//! histogram buckets over the raw sample range.

use crate::models::{HistogramBin, Result, RiskError, SimulationConfig, SimulationResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_MEAN: f64 = 1_000_000.0;
pub const DEFAULT_STDDEV: f64 = 300_000.0;
pub const DEFAULT_SIMULATIONS: usize = 10_000;
pub const DEFAULT_BINS: usize = 50;

/// Parameters of the loss distribution for one risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossPrior {
    pub mean: f64,
    pub stddev: f64,
}

impl Default for LossPrior {
    fn default() -> Self {
        Self {
            mean: DEFAULT_MEAN,
            stddev: DEFAULT_STDDEV,
        }
    }
}

/// Per-risk overrides, keyed by risk statement.
///
/// On disk this is a JSON object of `"risk": [mean, stddev]` pairs.
pub type CustomPriors = HashMap<String, (f64, f64)>;

/// Draws loss samples and summarizes them.
#[derive(Debug, Clone, Copy)]
pub struct Simulator {
    pub simulations: usize,
    pub bins: usize,
    pub seed: Option<u64>,
    pub prior: LossPrior,
}

impl Default for Simulator {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            bins: DEFAULT_BINS,
            seed: None,
            prior: LossPrior::default(),
        }
    }
}

impl From<&SimulationConfig> for Simulator {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            simulations: config.simulations,
            bins: config.bins,
            seed: config.seed,
            prior: LossPrior {
                mean: config.mean,
                stddev: config.stddev,
            },
        }
    }
}

impl Simulator {
    /// Simulate one risk with `prior`.
    pub fn run(&self, risk: &str, prior: LossPrior) -> Result<SimulationResult> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        simulate_with(risk, prior, self.simulations, self.bins, &mut rng)
    }

    /// Simulate every risk, using `custom` where it has an entry.
    ///
    /// With a fixed seed, risk `i` is seeded with `seed + i` so each run is
    /// reproducible on its own and independent of its neighbours.
    pub fn run_all(&self, risks: &[String], custom: &CustomPriors) -> Result<Vec<SimulationResult>> {
        risks
            .iter()
            .enumerate()
            .map(|(index, risk)| {
                let prior = custom
                    .get(risk)
                    .map(|&(mean, stddev)| LossPrior { mean, stddev })
                    .unwrap_or(self.prior);
                let runner = Simulator {
                    seed: self.seed.map(|s| s.wrapping_add(index as u64)),
                    ..*self
                };
                debug!(index, mean = prior.mean, stddev = prior.stddev, "Simulating risk");
                runner.run(risk, prior)
            })
            .collect()
    }
}

/// Simulate `n` losses for `risk_name` with the default bucket count.
///
/// `seed` fixes the generator; `None` draws from OS entropy.
pub fn simulate(
    risk_name: &str,
    mean: f64,
    stddev: f64,
    n: usize,
    seed: Option<u64>,
) -> Result<SimulationResult> {
    Simulator {
        simulations: n,
        seed,
        ..Simulator::default()
    }
    .run(risk_name, LossPrior { mean, stddev })
}

/// Core sampler over an injected generator.
pub fn simulate_with<R: Rng + ?Sized>(
    risk_name: &str,
    prior: LossPrior,
    n: usize,
    bins: usize,
    rng: &mut R,
) -> Result<SimulationResult> {
    if n == 0 {
        return Err(RiskError::InvalidArgument(
            "number of simulations must be positive".into(),
        ));
    }
    if bins == 0 {
        return Err(RiskError::InvalidArgument(
            "histogram needs at least one bin".into(),
        ));
    }
    if !prior.mean.is_finite() {
        return Err(RiskError::InvalidArgument(format!(
            "mean must be finite, got {}",
            prior.mean
        )));
    }
    if !prior.stddev.is_finite() || prior.stddev < 0.0 {
        return Err(RiskError::InvalidArgument(format!(
            "stddev must be finite and non-negative, got {}",
            prior.stddev
        )));
    }

    let normal = Normal::new(prior.mean, prior.stddev)
        .map_err(|e| RiskError::InvalidArgument(format!("normal distribution: {e}")))?;

    let mut samples = Vec::with_capacity(n);
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut avg = 0.0;
    for k in 1..=n {
        let x = normal.sample(rng);
        min = min.min(x);
        max = max.max(x);
        avg += (x - avg) / k as f64;
        samples.push(x);
    }

    Ok(SimulationResult {
        risk: risk_name.to_string(),
        min_loss: round_cents(min),
        max_loss: round_cents(max),
        avg_loss: round_cents(avg),
        simulations: n,
        histogram: histogram(&samples, min, max, bins),
    })
}

/// Equal-width buckets over `[min, max]`; the last bucket is closed.
///
/// A degenerate range collapses to a single bucket holding every sample.
pub fn histogram(samples: &[f64], min: f64, max: f64, bins: usize) -> Vec<HistogramBin> {
    if samples.is_empty() || bins == 0 {
        return Vec::new();
    }
    let width = (max - min) / bins as f64;
    if width <= 0.0 || !width.is_finite() {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: samples.len(),
        }];
    }

    let mut counts = vec![0usize; bins];
    for &x in samples {
        let slot = (((x - min) / width) as usize).min(bins - 1);
        counts[slot] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
        })
        .collect()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
