//! Readout training for ESN output weights
//!
//! Both solvers minimize `||X W - Y||^2 + lambda ||W||^2` over the design
//! matrix `X` (rows = timesteps, columns = readout features):
//!
//! - [`ReadoutSolver::NormalEquations`] factorizes `X^T X + lambda I`
//!   (Cholesky, then LU, then SVD as a last resort) and checks its condition
//!   number first.
//! - [`ReadoutSolver::PseudoInverse`] works on the SVD of `X` directly, dropping
//!   singular values below the usual pseudo-inverse cutoff. Slower, but it never
//!   squares the condition number.

use nalgebra::DMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::diagnostics::InstabilityWarning;
use crate::error::{Error, Result};

/// Sweep limit for every SVD; exceeding it is reported as [`Error::Linalg`]
pub(crate) const SVD_MAX_ITERATIONS: usize = 1_000;

/// Method used to solve for the output weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadoutSolver {
    /// Ridge regression through the normal equations
    #[default]
    NormalEquations,
    /// Ridge regression through the SVD of the design matrix
    PseudoInverse,
}

/// Output of a readout solve
#[derive(Debug, Clone)]
pub(crate) struct ReadoutFit {
    /// Output weights, shape (outputs x features)
    pub weights: Array2<f64>,
    /// Condition number of the matrix that was inverted
    pub condition_number: f64,
    pub diagnostics: Vec<InstabilityWarning>,
}

pub(crate) fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub(crate) fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Solve for output weights mapping `design` rows onto `targets` rows
pub(crate) fn fit_readout(
    design: &Array2<f64>,
    targets: &Array2<f64>,
    regularization: f64,
    condition_threshold: f64,
    solver: ReadoutSolver,
) -> Result<ReadoutFit> {
    if design.nrows() != targets.nrows() {
        return Err(Error::LengthMismatch {
            expected: design.nrows(),
            found: targets.nrows(),
        });
    }

    if design.iter().chain(targets.iter()).any(|v| !v.is_finite()) {
        return Err(Error::Linalg(
            "design or target matrix contains non-finite values".to_string(),
        ));
    }

    let x = to_dmatrix(design);
    let y = to_dmatrix(targets);

    let (w, condition_number, diagnostics) = match solver {
        ReadoutSolver::NormalEquations => {
            normal_equations(&x, &y, regularization, condition_threshold)?
        }
        ReadoutSolver::PseudoInverse => pseudo_inverse(&x, &y, regularization)?,
    };

    Ok(ReadoutFit {
        weights: to_array2(&w.transpose()),
        condition_number,
        diagnostics,
    })
}

type Solution = (DMatrix<f64>, f64, Vec<InstabilityWarning>);

fn normal_equations(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    regularization: f64,
    condition_threshold: f64,
) -> Result<Solution> {
    let mut diagnostics = Vec::new();
    let n_features = x.ncols();

    // (X^T X + λI) W = X^T Y
    let xt = x.transpose();
    let lhs = &xt * x + DMatrix::<f64>::identity(n_features, n_features) * regularization;
    let rhs = &xt * y;
    if lhs.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return Err(Error::Linalg(
            "normal equations overflowed, try ReadoutSolver::PseudoInverse".to_string(),
        ));
    }

    let condition_number = condition_number(&lhs)?;
    if condition_number.is_nan() || condition_number > condition_threshold {
        diagnostics.push(InstabilityWarning::IllConditioned {
            condition_number,
            threshold: condition_threshold,
        });
    }

    let direct = lhs
        .clone()
        .cholesky()
        .map(|cholesky| cholesky.solve(&rhs))
        .or_else(|| lhs.clone().lu().solve(&rhs))
        .filter(|w| w.iter().all(|v| v.is_finite()));

    let w = match direct {
        Some(w) => w,
        None => {
            diagnostics.push(InstabilityWarning::SolveFallback);
            let (w, _) = svd_solve(&lhs, &rhs, 0.0)?;
            w
        }
    };

    Ok((w, condition_number, diagnostics))
}

fn pseudo_inverse(x: &DMatrix<f64>, y: &DMatrix<f64>, regularization: f64) -> Result<Solution> {
    let mut diagnostics = Vec::new();

    let (w, rank) = svd_solve(x, y, regularization)?;
    let full_rank = x.nrows().min(x.ncols());
    if rank < full_rank {
        diagnostics.push(InstabilityWarning::RankDeficient { rank, full_rank });
    }

    Ok((w, condition_number(x)?, diagnostics))
}

fn not_converged() -> Error {
    Error::Linalg(format!(
        "SVD did not converge in {SVD_MAX_ITERATIONS} iterations"
    ))
}

fn ensure_finite(m: &DMatrix<f64>) -> Result<()> {
    if m.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::Linalg("cannot decompose a non-finite matrix".to_string()))
    }
}

/// Ratio of the largest to the smallest singular value
pub(crate) fn condition_number(m: &DMatrix<f64>) -> Result<f64> {
    ensure_finite(m)?;
    let svd = m
        .clone()
        .try_svd(false, false, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(not_converged)?;

    let s = &svd.singular_values;
    let s_max = s.iter().copied().fold(0.0_f64, f64::max);
    let s_min = s.iter().copied().fold(f64::INFINITY, f64::min);

    if s_min > 0.0 {
        Ok(s_max / s_min)
    } else {
        Ok(f64::INFINITY)
    }
}

/// Minimum-norm ridge solution of `a w = b` through the SVD of `a`.
///
/// Each singular value `s` above the cutoff contributes with filter factor
/// `s / (s^2 + λ)`; the rest are dropped. Returns the solution and the number
/// of retained singular values.
fn svd_solve(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    regularization: f64,
) -> Result<(DMatrix<f64>, usize)> {
    ensure_finite(a)?;
    let svd = a
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(not_converged)?;

    let u = svd
        .u
        .as_ref()
        .ok_or_else(|| Error::Linalg("SVD is missing U".to_string()))?;
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| Error::Linalg("SVD is missing V^T".to_string()))?;
    let s = &svd.singular_values;

    let s_max = s.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = f64::EPSILON * a.nrows().max(a.ncols()) as f64 * s_max;

    let mut projected = u.transpose() * b;
    let mut rank = 0;
    for (i, &si) in s.iter().enumerate() {
        let factor = if si > cutoff {
            rank += 1;
            si / (si * si + regularization)
        } else {
            0.0
        };
        for j in 0..projected.ncols() {
            projected[(i, j)] *= factor;
        }
    }

    Ok((v_t.transpose() * projected, rank))
}
