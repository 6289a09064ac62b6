//! riskmatrix - Risk register generation from company filings via an LLM.
//!
//! ## Stages
//!
//! - **Extraction**: filing text is cut into token windows, each window is
//!   sent with an extraction prompt and the returned JSON list is recovered
//! - **Scoring**: each risk is assigned a severity band (70% low, 28% medium,
//!   rest high) and scored for likelihood and impact inside that band
//! - **Treatment**: `likelihood * impact` routes each risk to Tolerate,
//!   Treat or Transfer
//! - **Simulation**: Treat risks get a normal-distribution loss simulation
//!
//! Every model call is retried a fixed number of times; failures are
//! contained per chunk or per risk so one bad answer never sinks a run.

pub mod client;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod simulation;
pub mod store;
pub mod text;

// Re-exports for convenience
pub use client::{CancellationToken, LLMClient, RetryPolicy, TextGenerator};
pub use models::{
    Action, Band, ClassifiedRisk, Config, Result, RiskError, RiskStatement, ScoredRisk,
    SimulationResult,
};
pub use pipeline::RiskPipeline;
pub use scoring::{BatchScorer, classify};
pub use simulation::simulate;
pub use store::ArtifactStore;
pub use text::{Chunker, TiktokenTokenizer, parse_risk_list};
