//! Token-bounded chunking.
//!
//! A document is encoded once and cut into consecutive windows of exactly
//! `max_tokens` tokens; only the last window may be shorter. Windows never
//! overlap and never drop a token, so decoding them in order gives back the
//! tokenizer's own round trip of the document.

use crate::models::{Result, RiskError};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Deterministic subword tokenizer.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode tokens to text. Windows that cut a multi-byte character get a
    /// replacement character instead of failing.
    fn decode(&self, tokens: &[u32]) -> String;
}

/// tiktoken `cl100k_base` encoder.
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RiskError::Internal(format!("loading cl100k_base tokenizer: {e}")))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    /// Token ids must come from [`Tokenizer::encode`] on this tokenizer.
    fn decode(&self, tokens: &[u32]) -> String {
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// An ordered, bounded window of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the document, starting at 0
    pub index: usize,
    pub tokens: Vec<u32>,
    pub text: String,
}

impl Chunk {
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

/// Splits documents into token windows.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
}

impl Chunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(RiskError::InvalidArgument(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(Self {
            tokenizer,
            max_tokens,
        })
    }

    pub fn token_count(&self, text: &str) -> usize {
        self.tokenizer.encode(text).len()
    }

    /// Cut `text` into consecutive windows. Empty text gives no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.tokenizer
            .encode(text)
            .chunks(self.max_tokens)
            .enumerate()
            .map(|(index, window)| Chunk {
                index,
                tokens: window.to_vec(),
                text: self.tokenizer.decode(window),
            })
            .collect()
    }
}

/// Pick at most `limit` evenly spaced positions out of `len`, first and last
/// included. Returns every position when `len <= limit`.
pub fn evenly_spaced(len: usize, limit: usize) -> Vec<usize> {
    if len <= limit {
        return (0..len).collect();
    }
    if limit == 0 {
        return Vec::new();
    }
    if limit == 1 {
        return vec![0];
    }
    (0..limit).map(|i| i * (len - 1) / (limit - 1)).collect()
}
