//! Numerical utilities around the core model

pub mod metrics;
pub mod normalizer;

pub use metrics::PredictionMetrics;
pub use normalizer::Normalizer;
