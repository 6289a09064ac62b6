//! Risk matrix stage: score the saved risk list.

use super::RiskPipeline;
use crate::models::{Result, RiskError};
use crate::scoring::{BatchScorer, ScorerOptions};
use crate::store::normalize_ticker;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MatrixReport {
    pub ticker: String,
    pub scored: usize,
    /// Positions floored to (1, 1) after scoring failed
    pub degraded: Vec<usize>,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

impl RiskPipeline {
    /// Score the first `max_risks` statements of `{T}_risks.json`.
    ///
    /// A cancelled run writes nothing.
    pub async fn score_matrix(&self, ticker: &str) -> Result<MatrixReport> {
        let ticker = normalize_ticker(ticker)?;
        let cfg = &self.config.scoring;

        let mut risks = self.store.load_risks(&ticker)?;
        if risks.len() > cfg.max_risks {
            info!(total = risks.len(), kept = cfg.max_risks, "Capping risk list");
            risks.truncate(cfg.max_risks);
        }
        info!(ticker = %ticker, risks = risks.len(), "Scoring risk matrix");

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pb = self.progress_bar(risks.len());
        let scorer = BatchScorer::new(self.client.clone(), ScorerOptions::from(cfg))
            .with_cancellation(self.cancel.clone())
            .with_progress(pb.clone());

        let batch = scorer.score_batch(&risks, &mut rng).await;
        if self.cancel.is_cancelled() {
            pb.abandon_with_message("cancelled");
            return Err(RiskError::Cancelled);
        }
        pb.finish_with_message(format!("{} degraded", batch.degraded.len()));

        if !batch.degraded.is_empty() {
            warn!(
                ticker = %ticker,
                positions = ?batch.degraded,
                "Degraded risks are recorded at minimum severity"
            );
        }

        let (json_path, csv_path) = self.store.save_matrix(&ticker, &batch.risks)?;
        info!(ticker = %ticker, path = %json_path.display(), "Saved risk matrix");

        Ok(MatrixReport {
            ticker,
            scored: batch.len(),
            degraded: batch.degraded,
            json_path,
            csv_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::client::CancellationToken;
    use crate::client::testing::ScriptedGenerator;
    use crate::models::{RiskError, Score};
    use crate::pipeline::testing::{pipeline, pipeline_with};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn risks(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Risk {i}")).collect()
    }

    #[tokio::test]
    async fn test_missing_risk_file() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(dir.path(), Arc::new(ScriptedGenerator::queued(vec![])));
        assert!(matches!(p.score_matrix("NOPE").await, Err(RiskError::NotFound(_))));
        assert!(!p.store().matrix_json_path("NOPE").exists());
    }

    #[tokio::test]
    async fn test_scores_capped_list_in_order() {
        let generator = Arc::new(ScriptedGenerator::with(|prompt| {
            if prompt.contains("between 1 and 4") {
                Ok(r#"{"likelihood": 2, "impact": 3}"#.into())
            } else if prompt.contains("between 5 and 8") {
                Ok(r#"{"likelihood": 6, "impact": 7}"#.into())
            } else {
                Ok(r#"{"likelihood": 10, "impact": 9}"#.into())
            }
        }));
        let dir = TempDir::new().unwrap();
        let p = pipeline_with(dir.path(), generator.clone(), |c| c.scoring.max_risks = 10);
        p.store().save_risks("ACME", &risks(12)).unwrap();

        let report = p.score_matrix("acme").await.unwrap();
        assert_eq!(report.scored, 10);
        assert!(report.degraded.is_empty());
        assert_eq!(generator.calls(), 10);

        let matrix = p.store().load_matrix("ACME").unwrap();
        let names: Vec<_> = matrix.iter().map(|r| r.risk.as_str()).collect();
        assert_eq!(names, risks(10));
        let high = matrix.iter().filter(|r| r.likelihood == 10).count();
        assert_eq!(high, 1);
        assert!(report.csv_path.exists());
    }

    #[tokio::test]
    async fn test_degraded_positions_reported() {
        let generator = Arc::new(ScriptedGenerator::with(|prompt| {
            if prompt.contains("\"Risk 2\"") {
                Ok("no idea".into())
            } else {
                Ok(r#"{"likelihood": 4, "impact": 4}"#.into())
            }
        }));
        let dir = TempDir::new().unwrap();
        let p = pipeline_with(dir.path(), generator, |c| {
            c.scoring.band_policy = crate::models::BandPolicy::Accept;
        });
        p.store().save_risks("ACME", &risks(4)).unwrap();

        let report = p.score_matrix("ACME").await.unwrap();
        assert_eq!(report.degraded, vec![2]);
        let matrix = p.store().load_matrix("ACME").unwrap();
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix[2].score(), Score::FALLBACK);
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dir = TempDir::new().unwrap();
        let p = pipeline(dir.path(), Arc::new(ScriptedGenerator::queued(vec![])))
            .with_cancellation(cancel);
        p.store().save_risks("ACME", &risks(3)).unwrap();

        assert!(matches!(p.score_matrix("ACME").await, Err(RiskError::Cancelled)));
        assert!(!p.store().matrix_json_path("ACME").exists());
    }
}
