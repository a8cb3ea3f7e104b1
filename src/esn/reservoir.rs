//! Reservoir dynamics and weight initialization

use nalgebra::linalg::Schur;
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::training::to_dmatrix;
use super::EsnConfig;

/// Saturating nonlinearity applied by reservoir neurons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    /// Hyperbolic tangent, range (-1, 1)
    #[default]
    Tanh,
    /// Logistic sigmoid, range (0, 1)
    Logistic,
}

impl Activation {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Logistic => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Fixed random recurrent layer of an ESN.
///
/// Weights are drawn once and never trained. The update is a leaky integrator:
///
/// ```text
/// r' = (1 - a) r + a f(W_in u + W_res r + b)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservoir {
    /// Input weight matrix (reservoir x input)
    w_in: Array2<f64>,
    /// Recurrent weight matrix (reservoir x reservoir)
    w_res: Array2<f64>,
    /// Per-neuron bias
    bias: Array1<f64>,
    /// Leaking rate `a`
    leaking_rate: f64,
    activation: Activation,
}

impl Reservoir {
    /// Draw reservoir weights from `rng` according to `config`
    pub fn new<R: Rng>(config: &EsnConfig, rng: &mut R) -> Self {
        let size = config.reservoir_dimensionality;

        // Input weights: uniform [-1, 1] scaled
        let w_in = Array2::random_using(
            (size, config.input_dimensionality),
            Uniform::new(-1.0, 1.0),
            rng,
        ) * config.input_scaling;

        let mut w_res = Array2::random_using((size, size), Uniform::new(-1.0, 1.0), rng);
        if config.sparsity < 1.0 {
            for elem in w_res.iter_mut() {
                if rng.gen::<f64>() > config.sparsity {
                    *elem = 0.0;
                }
            }
        }

        let radius = spectral_radius(&w_res);
        if radius > 1e-10 {
            w_res *= config.spectral_radius / radius;
        }

        let bias = if config.bias_scaling > 0.0 {
            Array1::random_using(size, Uniform::new(-1.0, 1.0), rng) * config.bias_scaling
        } else {
            Array1::zeros(size)
        };

        Self {
            w_in,
            w_res,
            bias,
            leaking_rate: config.leaking_rate,
            activation: config.activation,
        }
    }

    /// Next state given the current state and one input vector
    pub fn step(&self, state: &Array1<f64>, input: ArrayView1<'_, f64>) -> Array1<f64> {
        let pre_activation = self.w_in.dot(&input) + self.w_res.dot(state) + &self.bias;
        let activated = pre_activation.mapv(|x| self.activation.apply(x));

        if self.leaking_rate >= 1.0 {
            activated
        } else {
            state * (1.0 - self.leaking_rate) + activated * self.leaking_rate
        }
    }

    /// Whether the weight shapes match `config`
    pub(crate) fn matches(&self, config: &EsnConfig) -> bool {
        let size = config.reservoir_dimensionality;
        self.w_in.dim() == (size, config.input_dimensionality)
            && self.w_res.dim() == (size, size)
            && self.bias.len() == size
    }

    /// Number of neurons
    pub fn size(&self) -> usize {
        self.w_res.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.w_in.ncols()
    }

    pub fn input_weights(&self) -> &Array2<f64> {
        &self.w_in
    }

    pub fn recurrent_weights(&self) -> &Array2<f64> {
        &self.w_res
    }

    /// Spectral radius of the recurrent matrix
    pub fn spectral_radius(&self) -> f64 {
        spectral_radius(&self.w_res)
    }
}

/// Largest eigenvalue magnitude.
///
/// Uses the real Schur form; falls back to power iteration if it does not
/// converge.
pub(crate) fn spectral_radius(matrix: &Array2<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }

    match Schur::try_new(to_dmatrix(matrix), f64::EPSILON, 10_000) {
        Some(schur) => schur
            .complex_eigenvalues()
            .iter()
            .map(|lambda| lambda.re.hypot(lambda.im))
            .fold(0.0, f64::max),
        None => {
            tracing::debug!("Schur decomposition did not converge, using power iteration");
            power_iteration(matrix, 200)
        }
    }
}

fn power_iteration(matrix: &Array2<f64>, iterations: usize) -> f64 {
    let n = matrix.nrows();
    let mut v = Array1::from_elem(n, 1.0 / (n as f64).sqrt());

    for _ in 0..iterations {
        let v_new = matrix.dot(&v);
        let norm_new = norm(&v_new);
        if norm_new < 1e-10 {
            return 0.0;
        }
        v = v_new / norm_new;
    }

    norm(&matrix.dot(&v))
}

fn norm(v: &Array1<f64>) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> EsnConfig {
        EsnConfig::new(50, 3).spectral_radius(0.9)
    }

    #[test]
    fn test_reservoir_creation() {
        let mut rng = StdRng::seed_from_u64(7);
        let reservoir = Reservoir::new(&config(), &mut rng);

        assert_eq!(reservoir.size(), 50);
        assert_eq!(reservoir.input_dim(), 3);
        assert_eq!(reservoir.input_weights().dim(), (50, 3));
        assert!(reservoir.input_weights().iter().all(|w| w.abs() <= 0.5));
    }

    #[test]
    fn test_spectral_radius_scaling() {
        let mut rng = StdRng::seed_from_u64(42);
        let reservoir = Reservoir::new(&config(), &mut rng);

        assert_relative_eq!(reservoir.spectral_radius(), 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_sparse_reservoir() {
        let mut rng = StdRng::seed_from_u64(3);
        let reservoir = Reservoir::new(&config().sparsity(0.1), &mut rng);

        let nonzero = reservoir
            .recurrent_weights()
            .iter()
            .filter(|w| **w != 0.0)
            .count();
        assert!(nonzero > 0 && nonzero < 50 * 50 / 2);
    }

    #[test]
    fn test_reservoir_update() {
        let mut rng = StdRng::seed_from_u64(1);
        let reservoir = Reservoir::new(&config(), &mut rng);

        let input = array![0.5, -0.3, 0.8];
        let state = reservoir.step(&Array1::zeros(50), input.view());

        assert_eq!(state.len(), 50);
        assert!(state.iter().any(|&x| x != 0.0));
        assert!(state.iter().all(|&x| x.abs() < 1.0));
    }

    #[test]
    fn test_leaking_rate_blends_state() {
        let mut rng = StdRng::seed_from_u64(1);
        let leaky = Reservoir::new(&config().leaking_rate(0.25), &mut rng);

        let previous = Array1::from_elem(50, 0.4);
        let input = array![0.0, 0.0, 0.0];
        let state = leaky.step(&previous, input.view());

        let activated = leaky.recurrent_weights().dot(&previous).mapv(f64::tanh);
        for i in 0..50 {
            assert_relative_eq!(state[i], 0.75 * 0.4 + 0.25 * activated[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_activations() {
        assert_relative_eq!(Activation::Tanh.apply(0.0), 0.0);
        assert_relative_eq!(Activation::Logistic.apply(0.0), 0.5);
        assert!(Activation::Logistic.apply(50.0) <= 1.0);
    }

    #[test]
    fn test_power_iteration_on_diagonal() {
        let m = array![[0.5, 0.0], [0.0, -2.0]];
        assert_relative_eq!(power_iteration(&m, 200), 2.0, epsilon = 1e-6);
        assert_relative_eq!(spectral_radius(&m), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_spectral_radius_with_complex_eigenvalues() {
        // Scaled rotation, eigenvalues +-2i
        let m = array![[0.0, -2.0], [2.0, 0.0]];
        assert_relative_eq!(spectral_radius(&m), 2.0, epsilon = 1e-10);
    }
}
