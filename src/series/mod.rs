//! Uniformly-sampled multivariate time series
//!
//! A [`TimeSeries`] pairs a `(timesteps x channels)` matrix of observations with
//! a strictly increasing, evenly spaced vector of timestamps. Every constructor
//! and every operation that produces a new series re-establishes that invariant,
//! so downstream code (normalization, reservoir training, forecasting) can rely
//! on a single constant `timestep`.
//!
//! ## Example
//!
//! ```rust
//! use esn_forecast::TimeSeries;
//! use ndarray::{Array1, Array2};
//!
//! let t1 = TimeSeries::new(Array2::ones((4, 2)), Array1::range(0.0, 4.0, 1.0)).unwrap();
//! let t2 = TimeSeries::new(Array2::ones((4, 2)), Array1::range(4.0, 8.0, 1.0)).unwrap();
//!
//! let joined = t1.concatenate(&t2).unwrap();
//! assert_eq!(joined.len(), 8);
//! assert_eq!(joined.timestep(), 1.0);
//! ```

mod io;

use std::ops::{Bound, RangeBounds};

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Absolute tolerance when comparing time differences
pub const TIME_ATOL: f64 = 1e-8;

/// Relative tolerance (w.r.t. the timestep) when comparing time differences
pub const TIME_RTOL: f64 = 1e-5;

/// Whether two instants coincide on a grid with the given step
fn same_instant(a: f64, b: f64, step: f64) -> bool {
    (a - b).abs() <= TIME_ATOL + TIME_RTOL * step.abs()
}

fn check_step(step: f64) -> Result<()> {
    if !step.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "timestep must be finite, got {step}"
        )));
    }
    if step.abs() <= TIME_ATOL {
        return Err(Error::ZeroTimestep);
    }
    if step < 0.0 {
        return Err(Error::NonIncreasingTimes);
    }
    Ok(())
}

/// Validate a time axis and return its step.
///
/// With a single timestamp the step cannot be derived and must be supplied.
fn validate_times(times: &Array1<f64>, timestep: Option<f64>) -> Result<f64> {
    match (times.len(), timestep) {
        (0, _) => Err(Error::TooShort { len: 0, min: 1 }),
        (1, None) => Err(Error::TooShort { len: 1, min: 2 }),
        (1, Some(step)) => {
            check_step(step)?;
            Ok(step)
        }
        (_, expected) => {
            let step = times[1] - times[0];
            check_step(step)?;

            if let Some(expected) = expected {
                if !same_instant(step, expected, expected) {
                    return Err(Error::TimestepMismatch {
                        left: expected,
                        right: step,
                    });
                }
            }

            for (index, pair) in times.windows(2).into_iter().enumerate().skip(1) {
                let found = pair[1] - pair[0];
                if !same_instant(found, step, step) {
                    return Err(Error::NonUniformTimestep {
                        index,
                        expected: step,
                        found,
                    });
                }
            }

            Ok(expected.unwrap_or(step))
        }
    }
}

/// A uniformly-sampled multivariate signal.
///
/// Equality compares both arrays element-wise; the cached timestep is derived
/// from them and does not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TimeSeriesParts", into = "TimeSeriesParts")]
pub struct TimeSeries {
    /// Observations, shape (timesteps x channels)
    dependent_variable: Array2<f64>,
    /// Timestamps, one per row
    times: Array1<f64>,
    /// Constant spacing of `times`
    timestep: f64,
}

/// Unvalidated wire form of a [`TimeSeries`]
#[derive(Clone, Serialize, Deserialize)]
struct TimeSeriesParts {
    dependent_variable: Array2<f64>,
    times: Array1<f64>,
    timestep: f64,
}

impl TryFrom<TimeSeriesParts> for TimeSeries {
    type Error = Error;

    fn try_from(parts: TimeSeriesParts) -> Result<Self> {
        TimeSeries::with_timestep(parts.dependent_variable, parts.times, parts.timestep)
    }
}

impl From<TimeSeries> for TimeSeriesParts {
    fn from(series: TimeSeries) -> Self {
        Self {
            dependent_variable: series.dependent_variable,
            times: series.times,
            timestep: series.timestep,
        }
    }
}

impl TimeSeries {
    /// Create a series, deriving the timestep from `times`.
    ///
    /// # Errors
    ///
    /// - [`Error::LengthMismatch`] if the row count differs from `times.len()`
    /// - [`Error::TooShort`] with fewer than two timestamps
    /// - [`Error::ZeroTimestep`], [`Error::NonIncreasingTimes`] or
    ///   [`Error::NonUniformTimestep`] if `times` is not a uniform increasing grid
    pub fn new(dependent_variable: Array2<f64>, times: Array1<f64>) -> Result<Self> {
        Self::build(dependent_variable, times, None)
    }

    /// Create a series with an explicit timestep.
    ///
    /// This is the only way to build a single-row series. With two or more rows
    /// the supplied timestep must agree with the spacing of `times`.
    pub fn with_timestep(
        dependent_variable: Array2<f64>,
        times: Array1<f64>,
        timestep: f64,
    ) -> Result<Self> {
        Self::build(dependent_variable, times, Some(timestep))
    }

    /// Create a single-channel series from a flat vector of values
    pub fn univariate(values: Vec<f64>, times: Vec<f64>) -> Result<Self> {
        let dependent_variable = Array1::from(values).insert_axis(Axis(1));
        Self::new(dependent_variable, Array1::from(times))
    }

    /// Create a series from row vectors of equal width
    pub fn from_rows(rows: Vec<Vec<f64>>, times: Vec<f64>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let n_rows = rows.len();

        let mut flat = Vec::with_capacity(n_rows * width);
        for row in rows {
            if row.len() != width {
                return Err(Error::DimensionMismatch {
                    expected: width,
                    found: row.len(),
                });
            }
            flat.extend(row);
        }

        let dependent_variable = Array2::from_shape_vec((n_rows, width), flat)
            .map_err(|e| Error::InvalidParameter(e.to_string()))?;
        Self::new(dependent_variable, Array1::from(times))
    }

    fn build(
        dependent_variable: Array2<f64>,
        times: Array1<f64>,
        timestep: Option<f64>,
    ) -> Result<Self> {
        if dependent_variable.nrows() != times.len() {
            return Err(Error::LengthMismatch {
                expected: times.len(),
                found: dependent_variable.nrows(),
            });
        }
        if dependent_variable.ncols() == 0 {
            return Err(Error::InvalidParameter(
                "dependent variable needs at least one channel".to_string(),
            ));
        }

        let timestep = validate_times(&times, timestep)?;

        Ok(Self {
            dependent_variable,
            times,
            timestep,
        })
    }

    /// Same time axis, new values of identical shape
    pub(crate) fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        if values.dim() != self.dependent_variable.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.num_dims(),
                found: values.ncols(),
            });
        }
        Ok(Self {
            dependent_variable: values,
            times: self.times.clone(),
            timestep: self.timestep,
        })
    }

    /// Observations, shape (timesteps x channels)
    pub fn dependent_variable(&self) -> ArrayView2<'_, f64> {
        self.dependent_variable.view()
    }

    /// Timestamps
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// Constant spacing between consecutive timestamps
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Number of timesteps
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always `false` for a constructed series; provided for API completeness
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Number of channels
    pub fn num_dims(&self) -> usize {
        self.dependent_variable.ncols()
    }

    pub fn start_time(&self) -> f64 {
        self.times[0]
    }

    pub fn end_time(&self) -> f64 {
        self.times[self.len() - 1]
    }

    /// Fail with [`Error::NonFiniteValue`] at the first NaN or infinite observation
    pub fn check_finite(&self) -> Result<()> {
        match self
            .dependent_variable
            .indexed_iter()
            .find(|(_, v)| !v.is_finite())
        {
            Some(((row, channel), _)) => Err(Error::NonFiniteValue { row, channel }),
            None => Ok(()),
        }
    }

    /// Observation vector at row `index`
    pub fn row(&self, index: usize) -> Result<ArrayView1<'_, f64>> {
        if index >= self.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        Ok(self.dependent_variable.row(index))
    }

    /// Element-wise sum of two series sampled at the same instants
    pub fn add(&self, other: &TimeSeries) -> Result<TimeSeries> {
        self.combine(other, |a, b| a + b)
    }

    /// Element-wise difference of two series sampled at the same instants
    pub fn subtract(&self, other: &TimeSeries) -> Result<TimeSeries> {
        self.combine(other, |a, b| a - b)
    }

    fn combine<F>(&self, other: &TimeSeries, op: F) -> Result<TimeSeries>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.len() != other.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        self.check_dims(other)?;

        let aligned = self
            .times
            .iter()
            .zip(other.times.iter())
            .all(|(&a, &b)| same_instant(a, b, self.timestep));
        if !aligned {
            return Err(Error::TimeSpanMismatch);
        }

        let mut values = self.dependent_variable.clone();
        values.zip_mut_with(&other.dependent_variable, |a, &b| *a = op(*a, b));

        Ok(Self {
            dependent_variable: values,
            times: self.times.clone(),
            timestep: self.timestep,
        })
    }

    /// Append `other` after `self`.
    ///
    /// `other` must share the timestep and start exactly one step after
    /// `self` ends; overlapping, duplicated or gapped ranges are rejected.
    pub fn concatenate(&self, other: &TimeSeries) -> Result<TimeSeries> {
        self.check_dims(other)?;

        if !same_instant(other.timestep, self.timestep, self.timestep) {
            return Err(Error::TimestepMismatch {
                left: self.timestep,
                right: other.timestep,
            });
        }

        let expected_start = self.end_time() + self.timestep;
        if !same_instant(other.start_time(), expected_start, self.timestep) {
            return Err(Error::NonContiguous {
                expected_start,
                found_start: other.start_time(),
            });
        }

        let dependent_variable = ndarray::concatenate(
            Axis(0),
            &[self.dependent_variable.view(), other.dependent_variable.view()],
        )
        .map_err(|e| Error::InvalidParameter(e.to_string()))?;
        let times = ndarray::concatenate(Axis(0), &[self.times.view(), other.times.view()])
            .map_err(|e| Error::InvalidParameter(e.to_string()))?;

        Self::with_timestep(dependent_variable, times, self.timestep)
    }

    /// Single-row series at `index`
    pub fn get(&self, index: usize) -> Result<TimeSeries> {
        if index >= self.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        self.slice(index..=index)
    }

    /// New series over a contiguous sub-range of rows.
    ///
    /// Bounds past the end are [`Error::IndexOutOfBounds`]; empty ranges are
    /// [`Error::InvalidRange`].
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<TimeSeries> {
        let (start, end) = self.resolve_range(range)?;

        Ok(Self {
            dependent_variable: self.dependent_variable.slice(s![start..end, ..]).to_owned(),
            times: self.times.slice(s![start..end]).to_owned(),
            timestep: self.timestep,
        })
    }

    /// Overwrite rows `range` of both arrays with the contents of `other`.
    ///
    /// This is the only mutating operation on a series. `other` must have as
    /// many rows as the range, the same channel count and timestep, and the
    /// patched time axis must remain uniform. On error `self` is untouched.
    pub fn assign_slice<R: RangeBounds<usize>>(
        &mut self,
        range: R,
        other: &TimeSeries,
    ) -> Result<()> {
        let (start, end) = self.resolve_range(range)?;

        if other.len() != end - start {
            return Err(Error::LengthMismatch {
                expected: end - start,
                found: other.len(),
            });
        }
        self.check_dims(other)?;
        if !same_instant(other.timestep, self.timestep, self.timestep) {
            return Err(Error::TimestepMismatch {
                left: self.timestep,
                right: other.timestep,
            });
        }

        let mut times = self.times.clone();
        times.slice_mut(s![start..end]).assign(&other.times);
        validate_times(&times, Some(self.timestep))?;

        self.dependent_variable
            .slice_mut(s![start..end, ..])
            .assign(&other.dependent_variable);
        self.times = times;

        Ok(())
    }

    /// Element-wise comparison of both arrays within an absolute tolerance
    pub fn approx_eq(&self, other: &TimeSeries, tolerance: f64) -> bool {
        self.dependent_variable.dim() == other.dependent_variable.dim()
            && self.times.len() == other.times.len()
            && self
                .dependent_variable
                .iter()
                .zip(other.dependent_variable.iter())
                .chain(self.times.iter().zip(other.times.iter()))
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    fn check_dims(&self, other: &TimeSeries) -> Result<()> {
        if self.num_dims() != other.num_dims() {
            return Err(Error::DimensionMismatch {
                expected: self.num_dims(),
                found: other.num_dims(),
            });
        }
        Ok(())
    }

    fn resolve_range<R: RangeBounds<usize>>(&self, range: R) -> Result<(usize, usize)> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };

        if end > len {
            return Err(Error::IndexOutOfBounds {
                index: end - 1,
                len,
            });
        }
        if start >= end {
            return Err(Error::InvalidRange { start, end, len });
        }
        Ok((start, end))
    }
}

impl PartialEq for TimeSeries {
    fn eq(&self, other: &Self) -> bool {
        self.dependent_variable == other.dependent_variable && self.times == other.times
    }
}
