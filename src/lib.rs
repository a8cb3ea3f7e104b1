//! # ESN Forecast
//!
//! Reservoir computing for uniformly-sampled time series.
//!
//! This library provides a strict time-series container and an Echo State
//! Network (ESN) that learns a linear readout on top of a fixed random
//! recurrent reservoir, then forecasts by feeding its own outputs back in.
//!
//! ## Features
//!
//! - **TimeSeries**: uniform-timestep invariant, element-wise arithmetic,
//!   concatenation, slicing, slice assignment and exact CSV round-trips
//! - **ESN Core**: configurable reservoir size, spectral radius, leaking rate,
//!   sparsity and ridge regularization, with normal-equations or
//!   pseudo-inverse readout solvers
//! - **Diagnostics**: ill-conditioned training is reported as an
//!   [`InstabilityWarning`] instead of an error
//! - **Utils**: per-channel normalization and forecast metrics
//!
//! ## Quick Start
//!
//! ```rust
//! use esn_forecast::{EchoStateNetwork, EsnConfig, Normalizer, ReadoutSolver, TimeSeries};
//!
//! fn main() -> esn_forecast::Result<()> {
//!     let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.1).collect();
//!     let values = times.iter().map(|t| t.sin()).collect();
//!     let series = TimeSeries::univariate(values, times)?;
//!
//!     let mut normalizer = Normalizer::new();
//!     let normalized = normalizer.normalize(&series)?;
//!
//!     let config = EsnConfig::new(50, 1).regularization(1e-6).seed(42);
//!     let mut esn = EchoStateNetwork::new(config)?;
//!     let report = esn.train(&normalized, ReadoutSolver::NormalEquations)?;
//!     for warning in &report.diagnostics {
//!         eprintln!("{warning}");
//!     }
//!
//!     let forecast = normalizer.denormalize(&esn.predict(20)?)?;
//!     assert_eq!(forecast.len(), 20);
//!     Ok(())
//! }
//! ```

pub mod diagnostics;
pub mod error;
pub mod esn;
pub mod series;
pub mod utils;

// Re-export main types for convenience
pub use diagnostics::InstabilityWarning;
pub use error::{Error, Result};
pub use esn::{Activation, EchoStateNetwork, EsnConfig, ReadoutSolver, TrainingReport};
pub use series::TimeSeries;
pub use utils::{Normalizer, PredictionMetrics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
