//! Batch risk scorer.
//!
//! Every risk gets a band, one scoring prompt per attempt, and a strict
//! `{likelihood, impact}` parse. Risks that cannot be scored within the
//! retry budget are kept at minimum severity so the output lines up with
//! the input index for index.

use crate::client::{CancellationToken, RetryPolicy, TextGenerator, with_retry};
use crate::models::{
    Band, BandPolicy, Result, RiskError, RiskStatement, SCORE_MAX, SCORE_MIN, Score, ScoredRisk,
    ScoringConfig,
};
use crate::scoring::{assign_bands, build_scoring_prompt};
use crate::text::{Shape, recover_json};
use indicatif::ProgressBar;
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Knobs of the batch scorer.
#[derive(Debug, Clone, Copy)]
pub struct ScorerOptions {
    pub retry: RetryPolicy,
    /// Concurrent scoring calls (1 = strictly sequential)
    pub concurrency: usize,
    pub band_policy: BandPolicy,
}

impl Default for ScorerOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 1,
            band_policy: BandPolicy::Reject,
        }
    }
}

impl From<&ScoringConfig> for ScorerOptions {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.max_retries, config.retry_delay_secs),
            concurrency: config.concurrency.max(1),
            band_policy: config.band_policy,
        }
    }
}

/// Output of [`BatchScorer::score_batch`].
#[derive(Debug, Clone, Default)]
pub struct ScoredBatch {
    /// One record per input risk, in input order
    pub risks: Vec<ScoredRisk>,
    /// Band requested for each risk
    pub bands: Vec<Band>,
    /// Indices that fell back to minimum severity
    pub degraded: Vec<usize>,
}

impl ScoredBatch {
    pub fn len(&self) -> usize {
        self.risks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.risks.is_empty()
    }
}

/// Scores risk statements through a [`TextGenerator`].
#[derive(Clone)]
pub struct BatchScorer {
    client: Arc<dyn TextGenerator>,
    options: ScorerOptions,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
}

impl BatchScorer {
    pub fn new(client: Arc<dyn TextGenerator>, options: ScorerOptions) -> Self {
        Self {
            client,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop issuing attempts once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Tick `progress` once per scored risk.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Score a batch under the global band distribution.
    ///
    /// `rng` drives the band permutation only; seed it for reproducible runs.
    pub async fn score_batch<R: Rng + ?Sized>(
        &self,
        risks: &[RiskStatement],
        rng: &mut R,
    ) -> ScoredBatch {
        let bands = assign_bands(risks.len(), rng);
        let outcomes = if self.options.concurrency <= 1 {
            self.score_sequential(risks, &bands).await
        } else {
            self.score_concurrent(risks, &bands).await
        };

        let mut batch = ScoredBatch {
            risks: Vec::with_capacity(risks.len()),
            bands,
            degraded: Vec::new(),
        };

        for (index, (risk, outcome)) in risks.iter().zip(outcomes).enumerate() {
            let score = match outcome {
                Some(score) => score,
                None => {
                    batch.degraded.push(index);
                    Score::FALLBACK
                }
            };
            batch.risks.push(ScoredRisk::new(risk.clone(), score));
        }

        if !batch.degraded.is_empty() {
            warn!(
                degraded = batch.degraded.len(),
                total = batch.len(),
                "Some risks could not be scored and were floored to likelihood=1, impact=1"
            );
        }

        batch
    }

    async fn score_sequential(&self, risks: &[RiskStatement], bands: &[Band]) -> Vec<Option<Score>> {
        let mut outcomes = Vec::with_capacity(risks.len());
        for (index, (risk, band)) in risks.iter().zip(bands).enumerate() {
            info!(index = index + 1, total = risks.len(), band = %band, "Scoring risk");
            outcomes.push(self.score_logged(index, risk, *band).await);
        }
        outcomes
    }

    async fn score_concurrent(&self, risks: &[RiskStatement], bands: &[Band]) -> Vec<Option<Score>> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut handles = Vec::with_capacity(risks.len());

        for (index, (risk, band)) in risks.iter().zip(bands).enumerate() {
            let scorer = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let risk = risk.clone();
            let band = *band;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                debug!(index = index + 1, band = %band, "Scoring risk");
                scorer.score_logged(index, &risk, band).await
            }));
        }

        let mut outcomes = vec![None; risks.len()];
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(outcome) => outcomes[index] = outcome,
                Err(e) => warn!(index, error = %e, "Scoring task panicked"),
            }
        }
        outcomes
    }

    async fn score_logged(&self, index: usize, risk: &str, band: Band) -> Option<Score> {
        let result = self.score_one(risk, band).await;
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        match result {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(
                    index,
                    risk = %preview(risk),
                    error = %e,
                    "Failed to score risk, using fallback"
                );
                None
            }
        }
    }

    /// Score a single risk within `band`, retrying per the policy.
    pub async fn score_one(&self, risk: &str, band: Band) -> Result<Score> {
        let prompt = build_scoring_prompt(risk, band);
        let policy = self.options.band_policy;
        let client = self.client.as_ref();
        with_retry(&self.options.retry, &self.cancel, "score", |_| {
            let prompt = prompt.as_str();
            async move {
                let raw = client.extract(prompt).await?;
                parse_score(&raw, band, policy)
            }
        })
        .await
    }
}

/// Parse and validate a `{likelihood, impact}` object from model output.
pub fn parse_score(raw: &str, band: Band, policy: BandPolicy) -> Result<Score> {
    let object: Map<String, Value> = recover_json(raw, Shape::Object)?;
    let likelihood = score_field(&object, "likelihood", raw)?;
    let impact = score_field(&object, "impact", raw)?;

    match policy {
        BandPolicy::Accept => Ok(Score { likelihood, impact }),
        BandPolicy::Clamp => Ok(Score {
            likelihood: band.clamp(likelihood),
            impact: band.clamp(impact),
        }),
        BandPolicy::Reject if band.contains(likelihood) && band.contains(impact) => {
            Ok(Score { likelihood, impact })
        }
        BandPolicy::Reject => Err(RiskError::unparsable(
            format!("likelihood={likelihood}, impact={impact} outside {band} band"),
            raw,
        )),
    }
}

/// Read an integral field in [1, 10]; keys match case-insensitively.
fn score_field(object: &Map<String, Value>, name: &str, raw: &str) -> Result<u8> {
    let value = object
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
        .ok_or_else(|| RiskError::unparsable(format!("missing '{name}'"), raw))?;

    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        _ => None,
    }
    .ok_or_else(|| RiskError::unparsable(format!("'{name}' is not an integer: {value}"), raw))?;

    if !(i64::from(SCORE_MIN)..=i64::from(SCORE_MAX)).contains(&number) {
        return Err(RiskError::unparsable(
            format!("'{name}' = {number} outside [{SCORE_MIN}, {SCORE_MAX}]"),
            raw,
        ));
    }
    Ok(number as u8)
}

fn preview(risk: &str) -> String {
    let head: String = risk.chars().take(60).collect();
    if head.len() < risk.len() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::ScriptedGenerator;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn options() -> ScorerOptions {
        ScorerOptions {
            retry: RetryPolicy::new(2, 0.0),
            ..ScorerOptions::default()
        }
    }

    fn risks(n: usize) -> Vec<RiskStatement> {
        (0..n).map(|i| format!("Risk number {i}")).collect()
    }

    /// Answers with the lower bound of whatever band the prompt asks for.
    fn band_respecting() -> ScriptedGenerator {
        ScriptedGenerator::with(|prompt| {
            let value = if prompt.contains("between 1 and 4") {
                3
            } else if prompt.contains("between 5 and 8") {
                6
            } else {
                10
            };
            Ok(format!("```json\n{{\"likelihood\": {value}, \"impact\": {value}}}\n```"))
        })
    }

    #[test]
    fn test_parse_score_direct() {
        let score = parse_score(r#"{"likelihood": 2, "impact": 4}"#, Band::Low, BandPolicy::Reject)
            .unwrap();
        assert_eq!(score, Score { likelihood: 2, impact: 4 });
    }

    #[test]
    fn test_parse_score_accepts_integral_floats_and_key_case() {
        let score = parse_score(
            r#"Answer: {"Likelihood": 7.0, "IMPACT": 5}"#,
            Band::Medium,
            BandPolicy::Reject,
        )
        .unwrap();
        assert_eq!(score, Score { likelihood: 7, impact: 5 });
    }

    #[test]
    fn test_parse_score_rejects_bad_values() {
        for raw in [
            r#"{"likelihood": 7.5, "impact": 5}"#,
            r#"{"likelihood": "7", "impact": 5}"#,
            r#"{"likelihood": 0, "impact": 5}"#,
            r#"{"likelihood": 11, "impact": 5}"#,
            r#"{"likelihood": -3, "impact": 5}"#,
            r#"{"impact": 5}"#,
            "I would rate this as moderately likely.",
        ] {
            let result = parse_score(raw, Band::Medium, BandPolicy::Accept);
            assert!(
                matches!(result, Err(RiskError::UnparsableResponse { .. })),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_band_policies() {
        let raw = r#"{"likelihood": 8, "impact": 2}"#;
        assert!(parse_score(raw, Band::Low, BandPolicy::Reject).is_err());
        assert_eq!(
            parse_score(raw, Band::Low, BandPolicy::Clamp).unwrap(),
            Score { likelihood: 4, impact: 2 }
        );
        assert_eq!(
            parse_score(raw, Band::Low, BandPolicy::Accept).unwrap(),
            Score { likelihood: 8, impact: 2 }
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let generator = Arc::new(band_respecting());
        let scorer = BatchScorer::new(generator.clone(), options());
        let batch = scorer.score_batch(&[], &mut StdRng::seed_from_u64(1)).await;
        assert!(batch.is_empty());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_ten_risks_respect_bands() {
        let scorer = BatchScorer::new(Arc::new(band_respecting()), options());
        let input = risks(10);
        let batch = scorer.score_batch(&input, &mut StdRng::seed_from_u64(7)).await;

        assert_eq!(batch.len(), 10);
        assert!(batch.degraded.is_empty());
        let count = |b: Band| batch.bands.iter().filter(|x| **x == b).count();
        assert_eq!((count(Band::Low), count(Band::Medium), count(Band::High)), (7, 2, 1));

        for ((scored, band), risk) in batch.risks.iter().zip(&batch.bands).zip(&input) {
            assert_eq!(&scored.risk, risk);
            assert!(band.contains(scored.likelihood), "{scored:?} not in {band}");
            assert!(band.contains(scored.impact), "{scored:?} not in {band}");
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let generator = Arc::new(ScriptedGenerator::queued(vec![
            Err(RiskError::ServiceUnavailable("503".into())),
            Ok("not json at all".into()),
            Ok(r#"{"likelihood": 9, "impact": 9}"#.into()),
        ]));
        let scorer = BatchScorer::new(generator.clone(), options());
        let score = scorer.score_one("Fraud", Band::High).await.unwrap();
        assert_eq!(score, Score { likelihood: 9, impact: 9 });
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_out_of_band_is_retried() {
        let generator = Arc::new(ScriptedGenerator::queued(vec![
            Ok(r#"{"likelihood": 7, "impact": 7}"#.into()),
            Ok(r#"{"likelihood": 2, "impact": 3}"#.into()),
        ]));
        let scorer = BatchScorer::new(generator.clone(), options());
        let score = scorer.score_one("Fraud", Band::Low).await.unwrap();
        assert_eq!(score, Score { likelihood: 2, impact: 3 });
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_floors_to_minimum_severity() {
        // Unscoreable risks are silently floored to (1, 1) and so land in
        // "Tolerate"; the degraded list is the only trace of that.
        let generator = Arc::new(ScriptedGenerator::with(|prompt| {
            if prompt.contains("Risk number 1\"") {
                Err(RiskError::EmptyResponse)
            } else {
                Ok(r#"{"likelihood": 5, "impact": 5}"#.into())
            }
        }));
        let scorer = BatchScorer::new(
            generator.clone(),
            ScorerOptions {
                band_policy: BandPolicy::Accept,
                ..options()
            },
        );
        let input = risks(3);
        let batch = scorer.score_batch(&input, &mut StdRng::seed_from_u64(3)).await;

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.degraded, vec![1]);
        assert_eq!(batch.risks[1].score(), Score::FALLBACK);
        assert_eq!(batch.risks[1].risk, "Risk number 1");
        assert_eq!(batch.risks[0].score(), Score { likelihood: 5, impact: 5 });
        // 1 + 3 + 1 calls: the failing risk used its whole budget.
        assert_eq!(generator.calls(), 5);
    }

    #[tokio::test]
    async fn test_blocked_content_falls_back_without_retry() {
        let generator = Arc::new(ScriptedGenerator::with(|_| {
            Err(RiskError::BlockedContent {
                reason: "SAFETY".into(),
            })
        }));
        let scorer = BatchScorer::new(generator.clone(), options());
        let batch = scorer.score_batch(&risks(2), &mut StdRng::seed_from_u64(0)).await;
        assert_eq!(batch.degraded, vec![0, 1]);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scoring_keeps_input_order() {
        let generator = Arc::new(ScriptedGenerator::with(|prompt| {
            if prompt.contains("Risk number 4\"") || prompt.contains("Risk number 9\"") {
                Err(RiskError::ServiceUnavailable("down".into()))
            } else {
                Ok(r#"{"likelihood": 4, "impact": 4}"#.into())
            }
        }));
        let scorer = BatchScorer::new(
            generator,
            ScorerOptions {
                concurrency: 4,
                band_policy: BandPolicy::Accept,
                ..options()
            },
        );
        let input = risks(12);
        let batch = scorer.score_batch(&input, &mut StdRng::seed_from_u64(11)).await;

        assert_eq!(batch.len(), input.len());
        for (scored, risk) in batch.risks.iter().zip(&input) {
            assert_eq!(&scored.risk, risk);
        }
        assert_eq!(batch.degraded, vec![4, 9]);
    }

    #[tokio::test]
    async fn test_cancelled_batch_still_lines_up() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let generator = Arc::new(band_respecting());
        let scorer = BatchScorer::new(generator.clone(), options()).with_cancellation(cancel);
        let batch = scorer.score_batch(&risks(4), &mut StdRng::seed_from_u64(5)).await;
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.degraded, vec![0, 1, 2, 3]);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(100);
        assert_eq!(preview(&long).len(), 63);
    }
}
