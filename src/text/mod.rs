//! Text handling - chunking, prompt filling and JSON recovery.

mod chunker;
mod prompt;
mod recovery;

pub use chunker::*;
pub use prompt::*;
pub use recovery::*;
