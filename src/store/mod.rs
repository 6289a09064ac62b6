//! Artifact persistence - file layout, atomic writes and the CSV codec.

mod artifacts;
pub mod csv;

pub use artifacts::*;
