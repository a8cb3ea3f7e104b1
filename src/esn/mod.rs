//! Echo State Network Core Implementation
//!
//! This module provides:
//! - [`EsnConfig`]: hyperparameters with builder-style setters
//! - [`EchoStateNetwork`]: reservoir driving, readout training and
//!   closed-loop forecasting over [`TimeSeries`]
//! - [`ReadoutSolver`]: normal equations or pseudo-inverse
//!
//! Training uses the one-step-ahead convention. Starting from a zero state,
//! the reservoir consumes `x_0 .. x_{n-2}`; the features after consuming `x_t`
//! are regressed onto `x_{t+1}`. Forecasting continues the same recursion,
//! feeding each output back in as the next input.

mod reservoir;
mod training;

pub use reservoir::{Activation, Reservoir};
pub use training::ReadoutSolver;

use std::path::Path;

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::InstabilityWarning;
use crate::error::{Error, Result};
use crate::series::TimeSeries;

/// Configuration for Echo State Network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsnConfig {
    /// Number of neurons in the reservoir
    pub reservoir_dimensionality: usize,
    /// Number of channels in the modeled series
    pub input_dimensionality: usize,
    /// Ridge penalty on the output weights (>= 0)
    pub regularization: f64,
    /// Spectral radius of the recurrent matrix
    pub spectral_radius: f64,
    /// Scaling factor for input weights
    pub input_scaling: f64,
    /// Leaking rate for leaky integrator neurons, in (0, 1]
    pub leaking_rate: f64,
    /// Fraction of non-zero recurrent connections, in (0, 1]
    pub sparsity: f64,
    /// Scale of the per-neuron bias; 0 disables it
    pub bias_scaling: f64,
    pub activation: Activation,
    /// Number of leading training rows to discard
    pub washout: usize,
    /// Append the raw input to the readout features
    pub include_input: bool,
    /// Append a constant column to the readout features
    pub include_bias: bool,
    /// Condition number above which training reports instability
    pub condition_threshold: f64,
    /// Random seed for reproducibility; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for EsnConfig {
    fn default() -> Self {
        Self {
            reservoir_dimensionality: 100,
            input_dimensionality: 1,
            regularization: 1e-4,
            spectral_radius: 0.95,
            input_scaling: 0.5,
            leaking_rate: 1.0,
            sparsity: 1.0,
            bias_scaling: 0.0,
            activation: Activation::Tanh,
            washout: 0,
            include_input: false,
            include_bias: false,
            condition_threshold: 1e10,
            seed: None,
        }
    }
}

impl EsnConfig {
    /// Create a new configuration with default values
    pub fn new(reservoir_dimensionality: usize, input_dimensionality: usize) -> Self {
        Self {
            reservoir_dimensionality,
            input_dimensionality,
            ..Default::default()
        }
    }

    /// Set the regularization parameter
    pub fn regularization(mut self, reg: f64) -> Self {
        self.regularization = reg;
        self
    }

    /// Set the spectral radius
    pub fn spectral_radius(mut self, radius: f64) -> Self {
        self.spectral_radius = radius;
        self
    }

    /// Set the input scaling
    pub fn input_scaling(mut self, scaling: f64) -> Self {
        self.input_scaling = scaling;
        self
    }

    /// Set the leaking rate
    pub fn leaking_rate(mut self, rate: f64) -> Self {
        self.leaking_rate = rate;
        self
    }

    /// Set the sparsity
    pub fn sparsity(mut self, sparsity: f64) -> Self {
        self.sparsity = sparsity;
        self
    }

    /// Set the bias scaling
    pub fn bias_scaling(mut self, scaling: f64) -> Self {
        self.bias_scaling = scaling;
        self
    }

    /// Set the activation function
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Set the washout period
    pub fn washout(mut self, washout: usize) -> Self {
        self.washout = washout;
        self
    }

    pub fn include_input(mut self, include: bool) -> Self {
        self.include_input = include;
        self
    }

    pub fn include_bias(mut self, include: bool) -> Self {
        self.include_bias = include;
        self
    }

    /// Set the instability threshold
    pub fn condition_threshold(mut self, threshold: f64) -> Self {
        self.condition_threshold = threshold;
        self
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check that every hyperparameter is in range
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidParameter(msg));

        if self.reservoir_dimensionality == 0 {
            return invalid("reservoir_dimensionality must be positive".to_string());
        }
        if self.input_dimensionality == 0 {
            return invalid("input_dimensionality must be positive".to_string());
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return invalid(format!(
                "regularization must be finite and >= 0, got {}",
                self.regularization
            ));
        }
        if !(self.spectral_radius.is_finite() && self.spectral_radius >= 0.0) {
            return invalid(format!(
                "spectral_radius must be finite and >= 0, got {}",
                self.spectral_radius
            ));
        }
        if !(self.input_scaling.is_finite() && self.input_scaling >= 0.0) {
            return invalid(format!(
                "input_scaling must be finite and >= 0, got {}",
                self.input_scaling
            ));
        }
        if !(self.bias_scaling.is_finite() && self.bias_scaling >= 0.0) {
            return invalid(format!(
                "bias_scaling must be finite and >= 0, got {}",
                self.bias_scaling
            ));
        }
        if !(self.leaking_rate > 0.0 && self.leaking_rate <= 1.0) {
            return invalid(format!(
                "leaking_rate must be in (0, 1], got {}",
                self.leaking_rate
            ));
        }
        if !(self.sparsity > 0.0 && self.sparsity <= 1.0) {
            return invalid(format!("sparsity must be in (0, 1], got {}", self.sparsity));
        }
        if !(self.condition_threshold > 0.0) {
            return invalid(format!(
                "condition_threshold must be positive, got {}",
                self.condition_threshold
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Summary of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub solver: ReadoutSolver,
    /// Non-fatal numerical warnings raised while solving
    pub diagnostics: Vec<InstabilityWarning>,
    /// Condition number of the inverted matrix
    /// (`X^T X + λI` for normal equations, `X` for the pseudo-inverse)
    pub condition_number: f64,
    /// Mean squared one-step error on the training rows
    pub training_mse: f64,
    /// Rows in the design matrix after washout
    pub rows: usize,
    /// Readout features per row
    pub features: usize,
}

impl TrainingReport {
    /// Whether any instability diagnostic was raised
    pub fn has_instability(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn is_ill_conditioned(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|w| matches!(w, InstabilityWarning::IllConditioned { .. }))
    }
}

/// Trained readout and the context needed to continue the series
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Readout {
    /// Output weight matrix (outputs x features)
    w_out: Array2<f64>,
    /// Reservoir state after the last training input
    final_state: Array1<f64>,
    /// Last observation of the training series
    last_input: Array1<f64>,
    /// Time of the first training row; forecast times are `origin + k * timestep`
    origin: f64,
    /// Number of training rows, i.e. the grid index of the first forecast
    steps: usize,
    timestep: f64,
}

/// Echo State Network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoStateNetwork {
    config: EsnConfig,
    reservoir: Reservoir,
    readout: Option<Readout>,
}

impl EchoStateNetwork {
    /// Create a new Echo State Network seeded from `config.seed`
    pub fn new(config: EsnConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, &mut rng)
    }

    /// Create a new Echo State Network drawing weights from `rng`
    pub fn with_rng<R: Rng>(config: EsnConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let reservoir = Reservoir::new(&config, rng);

        Ok(Self {
            config,
            reservoir,
            readout: None,
        })
    }

    pub fn config(&self) -> &EsnConfig {
        &self.config
    }

    pub fn reservoir(&self) -> &Reservoir {
        &self.reservoir
    }

    /// Check if the network has been trained
    pub fn is_trained(&self) -> bool {
        self.readout.is_some()
    }

    /// Output weights (outputs x features), once trained
    pub fn output_weights(&self) -> Option<&Array2<f64>> {
        self.readout.as_ref().map(|r| &r.w_out)
    }

    /// Length of the readout feature vector
    pub fn feature_dim(&self) -> usize {
        let mut dim = self.config.reservoir_dimensionality;
        if self.config.include_input {
            dim += self.config.input_dimensionality;
        }
        if self.config.include_bias {
            dim += 1;
        }
        dim
    }

    /// Readout features `[1?, u?, r]`
    fn features(&self, state: &Array1<f64>, input: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut phi = Array1::zeros(self.feature_dim());
        let mut offset = 0;

        if self.config.include_bias {
            phi[0] = 1.0;
            offset += 1;
        }
        if self.config.include_input {
            phi.slice_mut(s![offset..offset + input.len()]).assign(&input);
            offset += input.len();
        }
        phi.slice_mut(s![offset..]).assign(state);

        phi
    }

    fn check_dims(&self, series: &TimeSeries) -> Result<()> {
        if series.num_dims() != self.config.input_dimensionality {
            return Err(Error::DimensionMismatch {
                expected: self.config.input_dimensionality,
                found: series.num_dims(),
            });
        }
        Ok(())
    }

    /// Drive the reservoir from rest over every row but the last.
    ///
    /// Returns the final state and, when `design` is set, fills it with the
    /// feature rows from index `washout` on.
    fn drive(
        &self,
        series: &TimeSeries,
        washout: usize,
        mut design: Option<&mut Array2<f64>>,
    ) -> Array1<f64> {
        let values = series.dependent_variable();
        let mut state = Array1::zeros(self.reservoir.size());

        for t in 0..series.len() - 1 {
            let input = values.row(t);
            state = self.reservoir.step(&state, input);

            if let Some(design) = design.as_deref_mut() {
                if t >= washout {
                    design
                        .row_mut(t - washout)
                        .assign(&self.features(&state, input));
                }
            }
        }

        state
    }

    /// Train the output weights on `series`.
    ///
    /// Output weights are replaced only on success; reservoir weights are never
    /// touched. Ill-conditioning does not fail training, it is reported in
    /// [`TrainingReport::diagnostics`] and logged.
    pub fn train(&mut self, series: &TimeSeries, solver: ReadoutSolver) -> Result<TrainingReport> {
        self.check_dims(series)?;
        series.check_finite()?;

        let n = series.len();
        if n < 2 {
            return Err(Error::TooShort { len: n, min: 2 });
        }
        let washout = self.config.washout;
        let total_rows = n - 1;
        if washout >= total_rows {
            return Err(Error::WashoutTooLarge {
                washout,
                rows: total_rows,
            });
        }

        let rows = total_rows - washout;
        let mut design = Array2::zeros((rows, self.feature_dim()));
        let final_state = self.drive(series, washout, Some(&mut design));

        let values = series.dependent_variable();
        let targets = values.slice(s![washout + 1.., ..]).to_owned();

        let fit = training::fit_readout(
            &design,
            &targets,
            self.config.regularization,
            self.config.condition_threshold,
            solver,
        )?;
        for warning in &fit.diagnostics {
            warning.log();
        }

        let residuals = design.dot(&fit.weights.t()) - &targets;
        let training_mse = residuals.mapv(|e| e * e).mean().unwrap_or(0.0);

        debug!(
            rows,
            features = self.feature_dim(),
            condition_number = fit.condition_number,
            training_mse,
            "trained readout with {:?}",
            solver
        );

        let report = TrainingReport {
            solver,
            diagnostics: fit.diagnostics,
            condition_number: fit.condition_number,
            training_mse,
            rows,
            features: self.feature_dim(),
        };

        self.readout = Some(Readout {
            w_out: fit.weights,
            final_state,
            last_input: values.row(n - 1).to_owned(),
            origin: series.start_time(),
            steps: n,
            timestep: series.timestep(),
        });

        Ok(report)
    }

    /// Generate `horizon` steps past the end of the training series.
    ///
    /// Each output is fed back as the next input. The network itself is not
    /// modified, so repeated calls return the same forecast.
    pub fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let readout = self.readout.as_ref().ok_or(Error::NotTrained)?;

        self.roll_out(
            readout,
            readout.final_state.clone(),
            readout.last_input.clone(),
            readout.origin,
            readout.steps,
            readout.timestep,
            horizon,
        )
    }

    /// Generate `horizon` steps past the end of `context`.
    ///
    /// The reservoir is warmed up on `context` from rest, then run closed-loop
    /// with the trained readout.
    pub fn forecast(&self, context: &TimeSeries, horizon: usize) -> Result<TimeSeries> {
        let readout = self.readout.as_ref().ok_or(Error::NotTrained)?;
        self.check_dims(context)?;
        context.check_finite()?;

        let state = self.drive(context, 0, None);
        let last_input = context.dependent_variable().row(context.len() - 1).to_owned();

        self.roll_out(
            readout,
            state,
            last_input,
            context.start_time(),
            context.len(),
            context.timestep(),
            horizon,
        )
    }

    fn roll_out(
        &self,
        readout: &Readout,
        mut state: Array1<f64>,
        mut input: Array1<f64>,
        origin: f64,
        steps: usize,
        timestep: f64,
        horizon: usize,
    ) -> Result<TimeSeries> {
        if horizon == 0 {
            return Err(Error::InvalidParameter(
                "horizon must be at least one step".to_string(),
            ));
        }

        let mut predictions = Array2::zeros((horizon, self.config.input_dimensionality));
        for k in 0..horizon {
            state = self.reservoir.step(&state, input.view());
            let output = readout.w_out.dot(&self.features(&state, input.view()));
            predictions.row_mut(k).assign(&output);
            input = output;
        }

        let times = Array1::from_shape_fn(horizon, |k| origin + timestep * (steps + k) as f64);
        TimeSeries::with_timestep(predictions, times, timestep)
    }

    /// Encode the network, trained or not, as bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a network written by [`to_bytes`](Self::to_bytes).
    ///
    /// Fails with [`Error::InvalidParameter`] if the decoded configuration is
    /// invalid or disagrees with the stored weight shapes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let esn: Self = bincode::deserialize(bytes)?;
        esn.config.validate()?;
        esn.check_shapes()?;
        Ok(esn)
    }

    fn check_shapes(&self) -> Result<()> {
        let inconsistent = |part: &str| {
            Err(Error::InvalidParameter(format!(
                "{part} does not match the network configuration"
            )))
        };

        if !self.reservoir.matches(&self.config) {
            return inconsistent("reservoir weights");
        }
        if let Some(readout) = &self.readout {
            let inputs = self.config.input_dimensionality;
            if readout.w_out.dim() != (inputs, self.feature_dim()) {
                return inconsistent("output weights");
            }
            if readout.final_state.len() != self.reservoir.size()
                || readout.last_input.len() != inputs
            {
                return inconsistent("readout state");
            }
        }
        Ok(())
    }

    /// Save the model to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Load a model from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }
}
