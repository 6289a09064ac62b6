//! Text-generation client module.
//!
//! The pipeline only sees [`TextGenerator`]: one prompt in, raw text out.
//! Retry policy lives with the callers, see [`retry`].

mod llm_client;
mod retry;

pub use llm_client::*;
pub use retry::*;

use crate::models::Result;
use async_trait::async_trait;

/// A single call to a generative-text service.
///
/// Implementations perform exactly one request per call and never retry.
/// Failures surface as `ServiceUnavailable`, `EmptyResponse` or
/// `BlockedContent`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn extract(&self, prompt: &str) -> Result<String>;
}
