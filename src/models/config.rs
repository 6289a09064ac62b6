//! Configuration models for riskmatrix.
//!
//! Every tunable of the pipeline lives here and is resolved once at startup
//! from a TOML file. Missing sections fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for riskmatrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Text-generation endpoint used for extraction and scoring
    #[serde(default)]
    pub llm: LlmConfig,

    /// Chunking and risk extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Banded scoring settings
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Monte Carlo priors
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,
}

/// Text-generation endpoint configuration.
///
/// Any OpenAI-compatible chat-completions API works (OpenRouter, vLLM, Ollama).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (can also be set via the `api_key_env` variable)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "google/gemini-pro-1.5".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Risk extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Token budget of a single chunk
    #[serde(default = "default_chunk_tokens")]
    pub max_tokens_per_chunk: usize,

    /// Upper bound on chunks sent to the model; larger documents are sampled
    /// at evenly spaced positions. `None` sends every chunk.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: Option<usize>,

    /// Number of headlines kept in news mode
    #[serde(default = "default_max_headlines")]
    pub max_headlines: usize,

    /// Filing prompt template file (`{COMPANY_NAME}`, `{FILING_TEXT}`)
    #[serde(default)]
    pub filing_prompt: Option<PathBuf>,

    /// News prompt template file (`{COMPANY_NAME}`, `{HEADLINES}`)
    #[serde(default)]
    pub news_prompt: Option<PathBuf>,

    /// Maximum retries per chunk on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
}

fn default_chunk_tokens() -> usize {
    10_000
}

fn default_max_chunks() -> Option<usize> {
    Some(50)
}

fn default_max_headlines() -> usize {
    15
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> f64 {
    2.0
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: default_chunk_tokens(),
            max_chunks: default_max_chunks(),
            max_headlines: default_max_headlines(),
            filing_prompt: None,
            news_prompt: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// What to do with a parsed score that falls outside its requested band.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BandPolicy {
    /// Treat as a parse failure and retry (default)
    #[default]
    Reject,
    /// Pull the value into the band range
    Clamp,
    /// Keep the value as long as it is within [1, 10]
    Accept,
}

/// Banded scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Maximum number of risks scored per ticker
    #[serde(default = "default_max_risks")]
    pub max_risks: usize,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,

    /// Concurrent scoring calls (1 = strictly sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Out-of-band handling
    #[serde(default)]
    pub band_policy: BandPolicy,

    /// Seed for the band shuffle (entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_risks() -> usize {
    200
}

fn default_concurrency() -> usize {
    1
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_risks: default_max_risks(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            concurrency: default_concurrency(),
            band_policy: BandPolicy::default(),
            seed: None,
        }
    }
}

/// Monte Carlo priors, in dollars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Mean loss
    #[serde(default = "default_mean")]
    pub mean: f64,

    /// Standard deviation of the loss
    #[serde(default = "default_stddev")]
    pub stddev: f64,

    /// Number of draws per simulation
    #[serde(default = "default_simulations")]
    pub simulations: usize,

    /// Histogram bins
    #[serde(default = "default_bins")]
    pub bins: usize,

    /// Sampler seed (entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_mean() -> f64 {
    1_000_000.0
}

fn default_stddev() -> f64 {
    300_000.0
}

fn default_simulations() -> usize {
    10_000
}

fn default_bins() -> usize {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mean: default_mean(),
            stddev: default_stddev(),
            simulations: default_simulations(),
            bins: default_bins(),
            seed: None,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for all artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extraction.max_tokens_per_chunk == 0 {
            return Err(ConfigError::Invalid(
                "extraction.max_tokens_per_chunk must be positive".to_string(),
            ));
        }
        if self.extraction.max_chunks == Some(0) {
            return Err(ConfigError::Invalid(
                "extraction.max_chunks must be positive when set".to_string(),
            ));
        }
        if self.scoring.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scoring.concurrency must be at least 1".to_string(),
            ));
        }
        for (name, delay) in [
            ("extraction.retry_delay_secs", self.extraction.retry_delay_secs),
            ("scoring.retry_delay_secs", self.scoring.retry_delay_secs),
        ] {
            if !delay.is_finite() || delay < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        if self.simulation.bins == 0 {
            return Err(ConfigError::Invalid(
                "simulation.bins must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.llm.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.llm.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.llm.api_key_env.clone(),
        })
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    re.replace_all(s, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or llm.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
