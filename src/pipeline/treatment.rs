//! 3T treatment stage.

use super::RiskPipeline;
use crate::models::{Action, Result};
use crate::scoring::{ActionCounts, classify_all};
use crate::store::{ArtifactStore, normalize_ticker};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct TreatmentReport {
    pub ticker: String,
    pub counts: ActionCounts,
    pub full_path: PathBuf,
    pub treat_path: PathBuf,
}

impl RiskPipeline {
    /// Classify the saved matrix and write the full and Treat-only registers.
    pub fn classify_matrix(&self, ticker: &str) -> Result<TreatmentReport> {
        classify_stored_matrix(&self.store, ticker)
    }
}

/// Classify a stored matrix without a model or tokenizer.
pub fn classify_stored_matrix(store: &ArtifactStore, ticker: &str) -> Result<TreatmentReport> {
    let ticker = normalize_ticker(ticker)?;
    let matrix = store.load_matrix(&ticker)?;

    let classified = classify_all(&matrix);
    let treat: Vec<_> = classified
        .iter()
        .filter(|c| c.action == Action::Treat)
        .cloned()
        .collect();
    let counts = ActionCounts::tally(&classified);

    let (full_path, treat_path) = store.save_classified(&ticker, &classified, &treat)?;
    info!(
        ticker = %ticker,
        tolerate = counts.tolerate,
        treat = counts.treat,
        transfer = counts.transfer,
        "Classified risk matrix"
    );

    Ok(TreatmentReport {
        ticker,
        counts,
        full_path,
        treat_path,
    })
}

#[cfg(test)]
mod tests {
    use super::classify_stored_matrix;
    use crate::client::testing::ScriptedGenerator;
    use crate::models::{Action, RiskError, Score, ScoredRisk};
    use crate::pipeline::testing::pipeline;
    use crate::store::ArtifactStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_writes_full_and_treat_registers() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(dir.path(), Arc::new(ScriptedGenerator::queued(vec![])));
        let matrix = vec![
            ScoredRisk::new("Pandemic", Score { likelihood: 10, impact: 10 }),
            ScoredRisk::new("Supplier, default", Score { likelihood: 8, impact: 5 }),
            ScoredRisk::new("Office leak", Score { likelihood: 5, impact: 5 }),
            ScoredRisk::new("Churn", Score { likelihood: 8, impact: 8 }),
        ];
        p.store().save_matrix("ACME", &matrix).unwrap();

        let report = p.classify_matrix("ACME").unwrap();
        assert_eq!((report.counts.tolerate, report.counts.treat, report.counts.transfer), (1, 2, 1));

        let treat = p.store().load_treat("ACME").unwrap();
        let names: Vec<_> = treat.iter().map(|c| c.risk.as_str()).collect();
        assert_eq!(names, vec!["Supplier, default", "Churn"]);
        assert!(treat.iter().all(|c| c.action == Action::Treat));

        let full = std::fs::read_to_string(report.full_path).unwrap();
        assert!(full.starts_with("risk,likelihood,impact,risk_score,action\n"));
        assert_eq!(full.lines().count(), 5);
    }

    #[test]
    fn test_classifies_from_store_alone() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let matrix = vec![
            ScoredRisk::new("Outage", Score { likelihood: 8, impact: 5 }),
            ScoredRisk::new("Typo", Score { likelihood: 1, impact: 1 }),
        ];
        store.save_matrix("ACME", &matrix).unwrap();

        let report = classify_stored_matrix(&store, "acme").unwrap();
        assert_eq!(report.ticker, "ACME");
        assert_eq!((report.counts.tolerate, report.counts.treat, report.counts.transfer), (1, 1, 0));
        assert_eq!(store.load_treat("ACME").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_matrix() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(dir.path(), Arc::new(ScriptedGenerator::queued(vec![])));
        assert!(matches!(p.classify_matrix("ACME"), Err(RiskError::NotFound(_))));
    }
}
