//! Risk register records.
//!
//! These types are the data handed from one pipeline stage to the next.
//! Each stage builds a new collection; nothing is mutated after creation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// A natural-language risk statement as extracted from model output.
pub type RiskStatement = String;

/// Lowest and highest value accepted for likelihood and impact.
pub const SCORE_MIN: u8 = 1;
pub const SCORE_MAX: u8 = 10;

/// Severity tier constraining the numeric range of a scored risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Low,
    Medium,
    High,
}

impl Band {
    /// Inclusive range for both likelihood and impact.
    pub fn range(self) -> RangeInclusive<u8> {
        match self {
            Band::Low => 1..=4,
            Band::Medium => 5..=8,
            Band::High => 9..=10,
        }
    }

    pub fn contains(self, value: u8) -> bool {
        self.range().contains(&value)
    }

    /// Pull a value into this band.
    pub fn clamp(self, value: u8) -> u8 {
        let range = self.range();
        value.clamp(*range.start(), *range.end())
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Low => write!(f, "low"),
            Band::Medium => write!(f, "medium"),
            Band::High => write!(f, "high"),
        }
    }
}

/// Likelihood/impact pair parsed from a scoring response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub likelihood: u8,
    pub impact: u8,
}

impl Score {
    /// Minimum-severity placeholder used when a risk cannot be scored.
    pub const FALLBACK: Score = Score {
        likelihood: 1,
        impact: 1,
    };
}

/// A risk statement annotated with likelihood and impact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRisk {
    pub risk: RiskStatement,
    pub likelihood: u8,
    pub impact: u8,
}

impl ScoredRisk {
    pub fn new(risk: impl Into<RiskStatement>, score: Score) -> Self {
        Self {
            risk: risk.into(),
            likelihood: score.likelihood,
            impact: score.impact,
        }
    }

    pub fn score(&self) -> Score {
        Score {
            likelihood: self.likelihood,
            impact: self.impact,
        }
    }
}

/// 3T treatment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Tolerate,
    Treat,
    Transfer,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Tolerate => "Tolerate",
            Action::Treat => "Treat",
            Action::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "Tolerate" => Ok(Action::Tolerate),
            "Treat" => Ok(Action::Treat),
            "Transfer" => Ok(Action::Transfer),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// A scored risk with its combined score and treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRisk {
    pub risk: RiskStatement,
    pub likelihood: u8,
    pub impact: u8,
    /// likelihood * impact, in [1, 100]
    pub risk_score: u16,
    pub action: Action,
}

/// One histogram bucket of simulated losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Summary of a Monte Carlo loss simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub risk: String,
    pub min_loss: f64,
    pub max_loss: f64,
    pub avg_loss: f64,
    /// Number of draws behind the summary
    pub simulations: usize,
    pub histogram: Vec<HistogramBin>,
}
