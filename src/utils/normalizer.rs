//! Per-channel standardization of time series

use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::series::TimeSeries;

/// A channel whose standard deviation is at most this fraction of its mean
/// magnitude is treated as constant
pub const RELATIVE_SCALE_FLOOR: f64 = 1e-12;

/// Fitted location and scale, one entry per channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChannelStatistics {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl ChannelStatistics {
    fn fit(series: &TimeSeries) -> Result<Self> {
        series.check_finite()?;
        let values = series.dependent_variable();
        let means = values.mean_axis(Axis(0)).ok_or(Error::TooShort {
            len: series.len(),
            min: 1,
        })?;
        let scales = values.std_axis(Axis(0), 0.0);

        let degenerate = means
            .iter()
            .zip(scales.iter())
            .position(|(m, s)| !s.is_finite() || *s <= RELATIVE_SCALE_FLOOR * m.abs());
        if let Some(channel) = degenerate {
            return Err(Error::ZeroVariance { channel });
        }

        Ok(Self { means, scales })
    }

    fn check_dims(&self, series: &TimeSeries) -> Result<()> {
        if series.num_dims() != self.means.len() {
            return Err(Error::DimensionMismatch {
                expected: self.means.len(),
                found: series.num_dims(),
            });
        }
        Ok(())
    }
}

/// Zero-mean, unit-variance transform fitted on first use.
///
/// The first call to [`normalize`](Self::normalize) computes per-channel means
/// and population standard deviations; every later `normalize` or
/// [`denormalize`](Self::denormalize) reuses them, so data normalized with one
/// instance share a single affine map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Normalizer {
    statistics: Option<ChannelStatistics>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether statistics have been computed
    pub fn is_fitted(&self) -> bool {
        self.statistics.is_some()
    }

    /// Fitted per-channel means
    pub fn means(&self) -> Option<&Array1<f64>> {
        self.statistics.as_ref().map(|s| &s.means)
    }

    /// Fitted per-channel standard deviations
    pub fn scales(&self) -> Option<&Array1<f64>> {
        self.statistics.as_ref().map(|s| &s.scales)
    }

    /// Map `series` to zero mean and unit variance per channel.
    ///
    /// # Errors
    ///
    /// - [`Error::NonFiniteValue`] if `series` holds NaN or infinite values
    /// - [`Error::ZeroVariance`] on the fitting call if a channel is constant,
    ///   meaning its standard deviation is zero or within rounding noise of
    ///   its mean ([`RELATIVE_SCALE_FLOOR`]); the normalizer stays unfitted
    /// - [`Error::DimensionMismatch`] if the channel count differs from the
    ///   fitted statistics
    pub fn normalize(&mut self, series: &TimeSeries) -> Result<TimeSeries> {
        if self.statistics.is_none() {
            self.statistics = Some(ChannelStatistics::fit(series)?);
        }
        let stats = self.statistics.as_ref().ok_or(Error::NotFitted)?;
        stats.check_dims(series)?;
        series.check_finite()?;

        let values = (&series.dependent_variable() - &stats.means) / &stats.scales;
        series.with_values(values)
    }

    /// Invert [`normalize`](Self::normalize)
    pub fn denormalize(&self, series: &TimeSeries) -> Result<TimeSeries> {
        let stats = self.statistics.as_ref().ok_or(Error::NotFitted)?;
        stats.check_dims(series)?;

        let values = &series.dependent_variable() * &stats.scales + &stats.means;
        series.with_values(values)
    }
}
