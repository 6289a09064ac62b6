//! Risk scoring - band assignment, scoring prompts, the batch scorer and
//! 3T classification.

mod bands;
mod classifier;
mod prompts;
mod scorer;

pub use bands::*;
pub use classifier::*;
pub use prompts::*;
pub use scorer::*;
