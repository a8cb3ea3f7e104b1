//! Error types for the ESN forecasting library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Consecutive timestamps are (numerically) equal
    #[error("timestep cannot be zero")]
    ZeroTimestep,

    /// Timestamps decrease
    #[error("times must be strictly increasing")]
    NonIncreasingTimes,

    /// Timestamps are not evenly spaced
    #[error("times must be uniformly spaced: step {index} is {found}, expected {expected}")]
    NonUniformTimestep {
        index: usize,
        expected: f64,
        found: f64,
    },

    /// Not enough timesteps for the requested operation
    #[error("series too short: {len} timesteps, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// Number of timesteps differ
    #[error("length mismatch: expected {expected} timesteps, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// Number of channels differ
    #[error("dimension mismatch: expected {expected} channels, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Two series are not sampled at the same instants
    #[error("series must span the same times")]
    TimeSpanMismatch,

    /// Two series have different sampling steps
    #[error("timestep mismatch: {left} vs {right}")]
    TimestepMismatch { left: f64, right: f64 },

    /// The second series does not start one step after the first ends
    #[error("series are not contiguous: expected next time {expected_start}, found {found_start}")]
    NonContiguous {
        expected_start: f64,
        found_start: f64,
    },

    /// Scalar index beyond the series
    #[error("index {index} out of bounds for series of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Empty or reversed range
    #[error("invalid range {start}..{end} for series of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// Prediction requested before training
    #[error("echo state network has not been trained")]
    NotTrained,

    /// Denormalization requested before any normalization
    #[error("normalizer has not been fitted")]
    NotFitted,

    /// NaN or infinite observation
    #[error("non-finite value at row {row}, channel {channel}")]
    NonFiniteValue { row: usize, channel: usize },

    /// A channel is constant, so its scale is undefined
    #[error("channel {channel} has zero variance")]
    ZeroVariance { channel: usize },

    /// Invalid configuration or argument
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Washout swallows all training rows
    #[error("washout ({washout}) must be smaller than the number of training rows ({rows})")]
    WashoutTooLarge { washout: usize, rows: usize },

    /// Decomposition did not converge
    #[error("linear algebra error: {0}")]
    Linalg(String),

    /// Malformed numeric field
    #[error("failed to parse data: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Binary model encoding error
    #[error("model encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if the error is a domain/value validation failure
    pub fn is_validation(&self) -> bool {
        !self.is_out_of_bounds()
            && !matches!(
                self,
                Error::Linalg(_)
                    | Error::Io(_)
                    | Error::Csv(_)
                    | Error::Encoding(_)
                    | Error::Json(_)
            )
    }

    /// Check if the error is an out-of-bounds access
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Error::IndexOutOfBounds { .. })
    }
}
