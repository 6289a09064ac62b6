//! Core data models for riskmatrix.

mod config;
mod error;
mod risk;

pub use config::*;
pub use error::*;
pub use risk::*;
