//! Monte Carlo stage over the Treat register.

use super::RiskPipeline;
use crate::models::{Result, SimulationConfig, SimulationResult};
use crate::simulation::{CustomPriors, Simulator};
use crate::store::{ArtifactStore, normalize_ticker, read_json};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub ticker: String,
    pub results: Vec<SimulationResult>,
    pub path: PathBuf,
}

/// Read a `{"risk": [mean, stddev]}` override file.
pub fn load_custom_priors(path: &Path) -> Result<CustomPriors> {
    read_json(path)
}

impl RiskPipeline {
    /// Simulate losses for every Treat risk of `ticker`.
    pub fn simulate_treat(&self, ticker: &str, custom: &CustomPriors) -> Result<SimulationReport> {
        simulate_stored_treat(&self.store, &self.config.simulation, ticker, custom)
    }
}

/// Simulate losses for the stored Treat register of `ticker`.
///
/// Risks named in `custom` use their own prior; the rest use the configured
/// defaults. An invalid prior aborts the run before anything is written.
pub fn simulate_stored_treat(
    store: &ArtifactStore,
    config: &SimulationConfig,
    ticker: &str,
    custom: &CustomPriors,
) -> Result<SimulationReport> {
    let ticker = normalize_ticker(ticker)?;
    let treat = store.load_treat(&ticker)?;
    let risks: Vec<String> = treat.into_iter().map(|c| c.risk).collect();

    let simulator = Simulator::from(config);
    info!(
        ticker = %ticker,
        risks = risks.len(),
        custom = custom.len(),
        simulations = simulator.simulations,
        "Simulating Treat risks"
    );

    let results = simulator.run_all(&risks, custom)?;
    let path = store.save_simulations(&ticker, &results)?;
    info!(ticker = %ticker, path = %path.display(), "Saved simulations");

    Ok(SimulationReport {
        ticker,
        results,
        path,
    })
}
