//! Pipeline module - the stages of a risk register run.
//!
//! Stage flow:
//! Filing text → Chunks → Risk list → Scored matrix → 3T register → Loss simulations
//!
//! Each stage reads the previous stage's artifact from the [`ArtifactStore`]
//! and writes its own, so stages can be run one at a time from the CLI.

mod extract;
mod matrix;
mod simulate;
mod treatment;

pub use extract::*;
pub use matrix::*;
pub use simulate::*;
pub use treatment::*;

use crate::client::{CancellationToken, RetryPolicy, TextGenerator};
use crate::models::{Config, Result};
use crate::store::{ArtifactStore, normalize_ticker};
use crate::text::Tokenizer;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::info;

/// Drives every stage against one configuration and one text generator.
pub struct RiskPipeline {
    config: Config,
    client: Arc<dyn TextGenerator>,
    tokenizer: Arc<dyn Tokenizer>,
    store: ArtifactStore,
    cancel: CancellationToken,
    show_progress: bool,
}

/// Output of [`RiskPipeline::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub extraction: ExtractionReport,
    pub matrix: MatrixReport,
    pub treatment: TreatmentReport,
}

impl RiskPipeline {
    pub fn new(config: Config, client: Arc<dyn TextGenerator>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        let store = ArtifactStore::new(config.output.data_dir.clone());
        Self {
            config,
            client,
            tokenizer,
            store,
            cancel: CancellationToken::new(),
            show_progress: true,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Hide progress bars (tests, non-interactive runs).
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Extract, score and classify a filing in one go.
    pub async fn run(&self, ticker: &str, filing_text: &str) -> Result<RunReport> {
        let ticker = normalize_ticker(ticker)?;
        info!(ticker = %ticker, "Starting risk pipeline");

        let extraction = self.extract_filing(&ticker, filing_text).await?;
        let matrix = self.score_matrix(&ticker).await?;
        let treatment = self.classify_matrix(&ticker)?;

        info!(
            ticker = %ticker,
            risks = extraction.risks,
            scored = matrix.scored,
            degraded = matrix.degraded.len(),
            "Risk pipeline finished"
        );

        Ok(RunReport {
            extraction,
            matrix,
            treatment,
        })
    }

    fn extraction_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.extraction.max_retries,
            self.config.extraction.retry_delay_secs,
        )
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::RiskPipeline;
    use crate::client::testing::ScriptedGenerator;
    use crate::models::Config;
    use crate::text::Tokenizer;
    use std::path::Path;
    use std::sync::Arc;

    /// One token per character.
    pub struct CharTokenizer;

    impl Tokenizer for CharTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            text.chars().map(u32::from).collect()
        }

        fn decode(&self, tokens: &[u32]) -> String {
            tokens.iter().filter_map(|&t| char::from_u32(t)).collect()
        }
    }

    pub fn pipeline(dir: &Path, generator: Arc<ScriptedGenerator>) -> RiskPipeline {
        let mut config = Config::default();
        config.output.data_dir = dir.to_path_buf();
        config.extraction.retry_delay_secs = 0.0;
        config.scoring.retry_delay_secs = 0.0;
        config.scoring.seed = Some(17);
        config.simulation.seed = Some(17);
        config.simulation.simulations = 200;
        RiskPipeline::new(config, generator, Arc::new(CharTokenizer)).quiet()
    }

    pub fn pipeline_with(
        dir: &Path,
        generator: Arc<ScriptedGenerator>,
        tweak: impl FnOnce(&mut Config),
    ) -> RiskPipeline {
        let mut p = pipeline(dir, generator);
        tweak(&mut p.config);
        p
    }
}
