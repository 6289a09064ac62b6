//! Monte Carlo loss simulation.

mod monte_carlo;

pub use monte_carlo::*;
