//! On-disk layout of pipeline artifacts.
//!
//! ```text
//! <root>/processed/{T}_risks.json
//! <root>/processed/{COMPANY}_news_risks.json
//! <root>/matrix_output/{T}_risk_matrix.json
//! <root>/matrix_output/{T}_risk_matrix.csv
//! <root>/reports/{T}_3T_risks.csv
//! <root>/reports/{T}_treat_risks_for_montecarlo.csv
//! <root>/reports/{T}_simulations.json
//! ```

use crate::models::{ClassifiedRisk, Result, RiskError, RiskStatement, ScoredRisk, SimulationResult};
use crate::store::csv;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upper-case, trimmed ticker; empty tickers and path separators are rejected.
pub fn normalize_ticker(ticker: &str) -> Result<String> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(RiskError::InvalidArgument("ticker must not be empty".into()));
    }
    check_file_stem("ticker", ticker)?;
    Ok(ticker.to_uppercase())
}

/// File-name stem for a company: trimmed, spaces become underscores.
pub fn company_stem(company: &str) -> Result<String> {
    let company = company.trim();
    if company.is_empty() {
        return Err(RiskError::InvalidArgument("company name must not be empty".into()));
    }
    check_file_stem("company name", company)?;
    Ok(company.replace(' ', "_"))
}

fn check_file_stem(what: &str, name: &str) -> Result<()> {
    if name.contains(['/', '\\', '\0']) {
        return Err(RiskError::InvalidArgument(format!(
            "{what} must not contain path separators: {name:?}"
        )));
    }
    Ok(())
}

/// Reads and writes artifacts under one data directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn risks_path(&self, ticker: &str) -> PathBuf {
        self.root.join("processed").join(format!("{ticker}_risks.json"))
    }

    pub fn news_risks_path(&self, company: &str) -> PathBuf {
        self.root.join("processed").join(format!("{company}_news_risks.json"))
    }

    pub fn matrix_json_path(&self, ticker: &str) -> PathBuf {
        self.root.join("matrix_output").join(format!("{ticker}_risk_matrix.json"))
    }

    pub fn matrix_csv_path(&self, ticker: &str) -> PathBuf {
        self.root.join("matrix_output").join(format!("{ticker}_risk_matrix.csv"))
    }

    pub fn classified_path(&self, ticker: &str) -> PathBuf {
        self.root.join("reports").join(format!("{ticker}_3T_risks.csv"))
    }

    pub fn treat_path(&self, ticker: &str) -> PathBuf {
        self.root
            .join("reports")
            .join(format!("{ticker}_treat_risks_for_montecarlo.csv"))
    }

    pub fn simulations_path(&self, ticker: &str) -> PathBuf {
        self.root.join("reports").join(format!("{ticker}_simulations.json"))
    }

    // ── risk lists ──────────────────────────────────────────────────────

    pub fn save_risks(&self, ticker: &str, risks: &[RiskStatement]) -> Result<PathBuf> {
        let path = self.risks_path(ticker);
        write_json(&path, risks)?;
        Ok(path)
    }

    pub fn save_news_risks(&self, company: &str, risks: &[RiskStatement]) -> Result<PathBuf> {
        let path = self.news_risks_path(company);
        write_json(&path, risks)?;
        Ok(path)
    }

    pub fn load_risks(&self, ticker: &str) -> Result<Vec<RiskStatement>> {
        read_json(&self.risks_path(ticker))
    }

    // ── scored matrix ───────────────────────────────────────────────────

    /// Write the matrix as JSON and CSV; returns both paths.
    pub fn save_matrix(&self, ticker: &str, risks: &[ScoredRisk]) -> Result<(PathBuf, PathBuf)> {
        let json_path = self.matrix_json_path(ticker);
        let csv_path = self.matrix_csv_path(ticker);
        write_json(&json_path, risks)?;
        write_text(&csv_path, &csv::matrix_csv(risks))?;
        Ok((json_path, csv_path))
    }

    pub fn load_matrix(&self, ticker: &str) -> Result<Vec<ScoredRisk>> {
        read_json(&self.matrix_json_path(ticker))
    }

    // ── 3T reports ──────────────────────────────────────────────────────

    /// Write the full register and its Treat-only subset.
    pub fn save_classified(
        &self,
        ticker: &str,
        classified: &[ClassifiedRisk],
        treat: &[ClassifiedRisk],
    ) -> Result<(PathBuf, PathBuf)> {
        let full_path = self.classified_path(ticker);
        let treat_path = self.treat_path(ticker);
        write_text(&full_path, &csv::classified_csv(classified))?;
        write_text(&treat_path, &csv::classified_csv(treat))?;
        Ok((full_path, treat_path))
    }

    pub fn load_treat(&self, ticker: &str) -> Result<Vec<ClassifiedRisk>> {
        csv::parse_classified(&read_text(&self.treat_path(ticker))?)
    }

    // ── simulations ─────────────────────────────────────────────────────

    pub fn save_simulations(&self, ticker: &str, results: &[SimulationResult]) -> Result<PathBuf> {
        let path = self.simulations_path(ticker);
        write_json(&path, results)?;
        Ok(path)
    }
}

/// Serialize `value` as pretty JSON, atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| RiskError::Internal(format!("Serializing {}: {e}", path.display())))?;
    write_text(path, &body)
}

/// Write `body` next to `path` and rename it into place.
pub fn write_text(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RiskError::io(format!("creating {}", parent.display()), e))?;
    }

    let temp_path = path.with_extension("tmp");
    let file = File::create(&temp_path)
        .map_err(|e| RiskError::io(format!("creating {}", temp_path.display()), e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(body.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| RiskError::io(format!("writing {}", temp_path.display()), e))?;
    drop(writer);

    fs::rename(&temp_path, path)
        .map_err(|e| RiskError::io(format!("renaming to {}", path.display()), e))?;

    debug!(path = %path.display(), bytes = body.len(), "Artifact written");
    Ok(())
}

/// Read a text artifact; a missing file is `NotFound`.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RiskError::NotFound(path.display().to_string()),
        _ => RiskError::io(format!("reading {}", path.display()), e),
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body = read_text(path)?;
    serde_json::from_str(&body).map_err(|source| RiskError::Decode {
        context: path.display().to_string(),
        source,
    })
}
