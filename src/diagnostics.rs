//! Non-fatal numerical diagnostics
//!
//! Training never fails because a regression problem is badly conditioned.
//! Instead the solver records an [`InstabilityWarning`] in the returned
//! [`TrainingReport`](crate::esn::TrainingReport) and logs it through `tracing`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Signal that a readout solve may be numerically unreliable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstabilityWarning {
    /// Condition number of the normal-equations matrix exceeds the threshold
    IllConditioned {
        condition_number: f64,
        threshold: f64,
    },
    /// Direct factorization failed; the SVD solve was used instead
    SolveFallback,
    /// Singular values fell below the pseudo-inverse cutoff
    RankDeficient { rank: usize, full_rank: usize },
}

impl InstabilityWarning {
    /// Emit the warning on the `tracing` channel
    pub(crate) fn log(&self) {
        tracing::warn!(target: "esn_forecast::instability", "{}", self);
    }
}

impl fmt::Display for InstabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllConditioned {
                condition_number,
                threshold,
            } => write!(
                f,
                "condition number {condition_number:.3e} exceeds {threshold:.3e}; \
                 consider more regularization or the pseudo-inverse solver"
            ),
            Self::SolveFallback => {
                write!(f, "normal equations could not be factorized, fell back to SVD")
            }
            Self::RankDeficient { rank, full_rank } => {
                write!(f, "design matrix has numerical rank {rank} of {full_rank}")
            }
        }
    }
}
