//! LLM client for OpenAI-compatible endpoints.
//!
//! One request per call: transient failures are reported, not retried.
//! The scorer and the extraction driver decide whether to try again.

use crate::client::TextGenerator;
use crate::models::{LlmConfig, Result, RiskError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest rate-limit pause honoured from a server hint.
const MAX_RETRY_AFTER_SECS: f64 = 300.0;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Finish reasons that mean the service withheld the content.
const BLOCKING_FINISH_REASONS: &[&str] = &["content_filter", "safety", "SAFETY"];

/// Generic LLM client for any OpenAI-compatible endpoint.
///
/// Built once from [`LlmConfig`] and shared by reference across the run.
pub struct LLMClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
    // Usage tracking
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
    total_requests: AtomicU64,
}

impl LLMClient {
    /// Create a new LLM client.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RiskError::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
        })
    }

    /// Model identifier requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build headers for a request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| RiskError::InvalidArgument("API key is not a valid header".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("X-Title", HeaderValue::from_static("riskmatrix"));
        Ok(headers)
    }

    /// Send one chat completion and return the generated text.
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RiskError::Timeout(self.timeout)
                } else {
                    RiskError::from(e)
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok());
            return Err(RiskError::RateLimited {
                retry_after_secs: parse_retry_after(retry_after),
            });
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error_body(status, body));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RiskError::ServiceUnavailable(format!("malformed completion body: {e}")))?;

        if let Some(usage) = &body.usage {
            self.total_input_tokens
                .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
            self.total_output_tokens
                .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        }

        let text = completion_text(body)?;

        debug!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = text.len(),
            "Completion received"
        );

        Ok(text)
    }

    /// Get total tokens tracked (input, output).
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Number of requests sent so far.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Health check: ping the /models endpoint.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/models", self.base_url);

        let headers = match self.headers() {
            Ok(h) => h,
            Err(e) => {
                return HealthCheckResult {
                    status: HealthStatus::Unreachable,
                    latency_ms: None,
                    error: Some(e.to_string()),
                };
            }
        };

        match self
            .client
            .get(&url)
            .headers(headers)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthCheckResult {
                        status: HealthStatus::Healthy,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                } else {
                    HealthCheckResult {
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        error: Some(format!("HTTP {}", response.status().as_u16())),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                status: HealthStatus::Unreachable,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn extract(&self, prompt: &str) -> Result<String> {
        self.complete(vec![Message::user(prompt)]).await
    }
}

/// Pull usable text out of a successful completion body.
fn completion_text(body: ChatCompletionResponse) -> Result<String> {
    let Some(choice) = body.choices.into_iter().next() else {
        return Err(RiskError::EmptyResponse);
    };

    if let Some(reason) = choice
        .finish_reason
        .as_deref()
        .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
    {
        return Err(RiskError::BlockedContent {
            reason: reason.to_string(),
        });
    }

    let message = choice.message.ok_or(RiskError::EmptyResponse)?;
    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(RiskError::BlockedContent { reason: refusal });
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(RiskError::EmptyResponse),
    }
}

/// Seconds to wait from a `retry-after` header, capped at
/// [`MAX_RETRY_AFTER_SECS`]. Missing, negative or non-finite values give 1s.
fn parse_retry_after(header: Option<&str>) -> f64 {
    header
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(1.0, |secs| secs.min(MAX_RETRY_AFTER_SECS))
}

/// Map a non-success HTTP response to the error taxonomy.
fn classify_error_body(status: u16, body: String) -> RiskError {
    let parsed = serde_json::from_str::<ApiErrorResponse>(&body).ok();
    let message = parsed
        .as_ref()
        .map(|p| p.error.message.clone())
        .unwrap_or(body);

    let moderated = parsed
        .as_ref()
        .and_then(|p| p.error.code.as_ref())
        .is_some_and(|c| c.as_str() == Some("content_filter"))
        || (status == 403 && message.to_lowercase().contains("flagged"));

    if moderated {
        RiskError::BlockedContent { reason: message }
    } else if status >= 500 {
        RiskError::ServiceUnavailable(format!("status {status}: {message}"))
    } else {
        RiskError::Api { status, message }
    }
}

/// Health check result.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Health status
    pub status: HealthStatus,
    /// Latency in milliseconds (if reachable)
    pub latency_ms: Option<u64>,
    /// Error message (if unhealthy or unreachable)
    pub error: Option<String>,
}

/// Health status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Endpoint is responding normally
    Healthy,
    /// Endpoint is responding but with errors
    Unhealthy,
    /// Endpoint is not reachable
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}
