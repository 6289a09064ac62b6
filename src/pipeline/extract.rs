//! Risk extraction from filings and news headlines.

use super::RiskPipeline;
use crate::client::with_retry;
use crate::models::{Result, RiskError, RiskStatement};
use crate::store::{company_stem, normalize_ticker};
use crate::text::{
    Chunker, FILING_TEMPLATE, NEWS_TEMPLATE, evenly_spaced, fill, load_template, parse_risk_list,
};
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of a filing extraction.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub ticker: String,
    /// Chunks the document was cut into
    pub chunks_total: usize,
    /// Chunks sent for extraction
    pub chunks_used: usize,
    /// Chunks whose extraction failed and were skipped
    pub chunks_failed: usize,
    /// Risk statements written
    pub risks: usize,
    pub path: PathBuf,
}

/// Outcome of a news extraction.
#[derive(Debug, Clone)]
pub struct NewsReport {
    pub company: String,
    pub headlines: usize,
    pub risks: Vec<RiskStatement>,
    pub path: PathBuf,
}

/// Non-blank lines of `text`, trimmed, at most `limit` of them.
pub fn parse_headlines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(limit)
        .map(String::from)
        .collect()
}

impl RiskPipeline {
    /// Extract risks from a filing and save them as `{T}_risks.json`.
    ///
    /// Chunks that fail after retries are logged and skipped; risks from the
    /// remaining chunks are kept in chunk order.
    pub async fn extract_filing(&self, ticker: &str, text: &str) -> Result<ExtractionReport> {
        let ticker = normalize_ticker(ticker)?;
        let cfg = &self.config.extraction;

        let chunker = Chunker::new(self.tokenizer.clone(), cfg.max_tokens_per_chunk)?;
        let chunks = chunker.chunk(text);
        if chunks.is_empty() {
            return Err(RiskError::InvalidArgument(format!(
                "filing text for {ticker} is empty"
            )));
        }

        let selected = match cfg.max_chunks {
            Some(limit) => evenly_spaced(chunks.len(), limit),
            None => (0..chunks.len()).collect(),
        };
        info!(
            ticker = %ticker,
            chunks = chunks.len(),
            selected = selected.len(),
            "Extracting risks from filing"
        );

        let template = load_template(cfg.filing_prompt.as_deref(), FILING_TEMPLATE)?;
        let pb = self.progress_bar(selected.len());
        let mut risks = Vec::new();
        let mut failed = 0;

        for (n, &index) in selected.iter().enumerate() {
            let prompt = fill(
                &template,
                &[("COMPANY_NAME", &ticker), ("FILING_TEXT", &chunks[index].text)],
            );
            info!(chunk = n + 1, of = selected.len(), "Extracting chunk");

            match self.extract_risks(&prompt, "extract").await {
                Ok(found) => risks.extend(found),
                Err(RiskError::Cancelled) => {
                    pb.abandon_with_message("cancelled");
                    return Err(RiskError::Cancelled);
                }
                Err(e) => {
                    failed += 1;
                    warn!(chunk = n + 1, index, error = %e, "Chunk extraction failed, skipping");
                }
            }
            pb.inc(1);
            pb.set_message(format!("{} risks", risks.len()));
        }
        pb.finish_with_message(format!("{} risks", risks.len()));

        let path = self.store.save_risks(&ticker, &risks)?;
        info!(ticker = %ticker, risks = risks.len(), failed, path = %path.display(), "Saved risks");

        Ok(ExtractionReport {
            ticker,
            chunks_total: chunks.len(),
            chunks_used: selected.len(),
            chunks_failed: failed,
            risks: risks.len(),
            path,
        })
    }

    /// Extract risks suggested by news headlines for `company`.
    pub async fn extract_news(&self, company: &str, headlines: &[String]) -> Result<NewsReport> {
        let company = company.trim();
        let file_stem = company_stem(company)?;
        let cfg = &self.config.extraction;
        let headlines: Vec<&String> = headlines.iter().take(cfg.max_headlines).collect();
        if headlines.is_empty() {
            return Err(RiskError::NotFound(format!("headlines for {company}")));
        }

        let listing = headlines
            .iter()
            .map(|h| format!("- {h}"))
            .collect::<Vec<_>>()
            .join("\n");
        let template = load_template(cfg.news_prompt.as_deref(), NEWS_TEMPLATE)?;
        let prompt = fill(&template, &[("COMPANY_NAME", company), ("HEADLINES", &listing)]);

        info!(company, headlines = headlines.len(), "Extracting risks from news");
        let risks = self.extract_risks(&prompt, "extract-news").await?;

        let path = self.store.save_news_risks(&file_stem, &risks)?;
        info!(company, risks = risks.len(), path = %path.display(), "Saved news risks");

        Ok(NewsReport {
            company: company.to_string(),
            headlines: headlines.len(),
            risks,
            path,
        })
    }

    async fn extract_risks(&self, prompt: &str, label: &str) -> Result<Vec<RiskStatement>> {
        let client = self.client.as_ref();
        with_retry(&self.extraction_retry(), &self.cancel, label, |_| async move {
            let raw = client.extract(prompt).await?;
            parse_risk_list(&raw)
        })
        .await
    }
}
