//! Forecast evaluation metrics

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::series::TimeSeries;

/// Error metrics of a forecast against the observed series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Largest absolute error
    pub max_error: f64,
    /// R-squared (coefficient of determination), pooled over channels
    pub r_squared: f64,
}

impl PredictionMetrics {
    /// Compare a forecast with the observed values at the same instants.
    ///
    /// Fails like [`TimeSeries::subtract`] when lengths, channel counts or
    /// time axes differ.
    pub fn compare(actual: &TimeSeries, predicted: &TimeSeries) -> Result<Self> {
        let residuals = predicted.subtract(actual)?;
        let errors = residuals.dependent_variable();
        let n = errors.len() as f64;

        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let max_error = errors.iter().fold(0.0_f64, |acc, e| acc.max(e.abs()));

        // Total sum of squares around each channel's own mean
        let values = actual.dependent_variable();
        let ss_tot: f64 = values
            .columns()
            .into_iter()
            .map(|channel| {
                let mean = channel.mean().unwrap_or(0.0);
                channel.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            })
            .sum();
        let ss_res = mse * n;
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Ok(Self {
            mse,
            mae,
            rmse: mse.sqrt(),
            max_error,
            r_squared,
        })
    }
}

impl fmt::Display for PredictionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Prediction Metrics ===")?;
        writeln!(f, "MSE:        {:.6}", self.mse)?;
        writeln!(f, "MAE:        {:.6}", self.mae)?;
        writeln!(f, "RMSE:       {:.6}", self.rmse)?;
        writeln!(f, "Max error:  {:.6}", self.max_error)?;
        write!(f, "R-squared:  {:.4}", self.r_squared)
    }
}
