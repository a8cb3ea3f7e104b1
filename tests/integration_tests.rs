//! Integration Tests for the ESN Forecast Library

use std::io::Cursor;

use approx::assert_abs_diff_eq;
use esn_forecast::{
    EchoStateNetwork, Error, EsnConfig, InstabilityWarning, Normalizer, PredictionMetrics,
    ReadoutSolver, TimeSeries,
};
use ndarray::{array, concatenate, s, Array1, Array2, Axis};

fn arange(n: usize) -> Array1<f64> {
    Array1::range(0.0, n as f64, 1.0)
}

/// Two channels, cos and sin of 0..10
fn cos_sin_series() -> TimeSeries {
    let times = arange(10);
    let values = ndarray::stack![Axis(1), times.mapv(f64::cos), times.mapv(f64::sin)];
    TimeSeries::new(values, times).unwrap()
}

fn four_rows() -> TimeSeries {
    TimeSeries::new(
        array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]],
        array![0.0, 1.0, 2.0, 3.0],
    )
    .unwrap()
}

#[test]
fn test_non_uniform_timestep_error() {
    let times: Vec<f64> = (0..10).map(|i| 10f64.powf(i as f64 / 9.0)).collect();
    let err = TimeSeries::univariate(vec![1.0; 10], times).unwrap_err();

    assert!(matches!(err, Error::NonUniformTimestep { .. }));
    assert!(err.is_validation());
}

#[test]
fn test_zero_timestep_error() {
    let err = TimeSeries::univariate(vec![1.0; 10], vec![0.0; 10]).unwrap_err();

    assert!(matches!(err, Error::ZeroTimestep));
    assert!(err.is_validation());
}

#[test]
fn test_can_save_and_load_time_series() {
    let original = TimeSeries::new(Array2::ones((10, 2)), arange(10)).unwrap();

    let mut buffer = Vec::new();
    original.save(&mut buffer).unwrap();
    let loaded = TimeSeries::from_csv(Cursor::new(buffer)).unwrap();

    assert_eq!(original, loaded);
}

#[test]
fn test_save_and_load_through_file() {
    let path = std::env::temp_dir().join(format!("esn_forecast_{}.csv", std::process::id()));
    let original = cos_sin_series();

    original.save_to_path(&path).unwrap();
    let loaded = TimeSeries::from_csv_path(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(original, loaded.unwrap());
}

#[test]
fn test_normalizer_inversion() {
    let times = arange(10);
    let original = TimeSeries::new(times.mapv(f64::sin).insert_axis(Axis(1)), times).unwrap();

    let mut normalizer = Normalizer::new();
    let normalized = normalizer.normalize(&original).unwrap();
    let denormalized = normalizer.denormalize(&normalized).unwrap();

    assert!(original.approx_eq(&denormalized, 1e-12));
    assert_eq!(original.times(), denormalized.times());
}

#[test]
fn test_condition_number_warning() {
    let config = EsnConfig::new(10, 2).regularization(0.0);
    let mut esn = EchoStateNetwork::new(config).unwrap();

    let report = esn
        .train(&cos_sin_series(), ReadoutSolver::NormalEquations)
        .unwrap();

    assert!(report.is_ill_conditioned());
    assert!(report
        .diagnostics
        .iter()
        .any(|w| matches!(w, InstabilityWarning::IllConditioned { .. })));
    assert!(esn.is_trained());
}

#[test]
fn test_pinv_workaround() {
    let config = EsnConfig::new(10, 2).regularization(0.0);
    let mut esn = EchoStateNetwork::new(config).unwrap();

    let report = esn
        .train(&cos_sin_series(), ReadoutSolver::PseudoInverse)
        .unwrap();

    assert!(!report.is_ill_conditioned());
    assert_eq!(report.rows, 9);
    assert!(esn.output_weights().unwrap().iter().all(|w| w.is_finite()));
    assert_eq!(esn.predict(3).unwrap().len(), 3);
}

#[test]
fn test_can_add_time_series() {
    let times = arange(10);
    let t1 = TimeSeries::new(times.mapv(f64::cos).insert_axis(Axis(1)), times.clone()).unwrap();
    let t2 = TimeSeries::new(times.mapv(f64::sin).insert_axis(Axis(1)), times.clone()).unwrap();

    let t = t1.add(&t2).unwrap();

    assert_eq!(
        t.dependent_variable(),
        &t1.dependent_variable() + &t2.dependent_variable()
    );
    assert_eq!(t.times(), t1.times());
    assert_eq!(t1.times(), t2.times());
}

#[test]
fn test_time_series_addition_num_timesteps_error() {
    let t1 = TimeSeries::new(arange(10).mapv(f64::cos).insert_axis(Axis(1)), arange(10)).unwrap();
    let t2 = TimeSeries::new(arange(11).mapv(f64::sin).insert_axis(Axis(1)), arange(11)).unwrap();

    let err = t1.add(&t2).unwrap_err();
    assert!(matches!(err, Error::LengthMismatch { expected: 10, found: 11 }));
    assert!(err.is_validation());
}

#[test]
fn test_time_series_addition_spanning_error() {
    let t1 = TimeSeries::new(arange(10).mapv(f64::cos).insert_axis(Axis(1)), arange(10)).unwrap();
    let t2 = TimeSeries::new(
        arange(10).mapv(f64::sin).insert_axis(Axis(1)),
        arange(10) * 0.5,
    )
    .unwrap();

    assert!(matches!(t1.add(&t2), Err(Error::TimeSpanMismatch)));
}

#[test]
fn test_can_subtract_time_series() {
    let t1 = TimeSeries::new(array![[10.0, 10.0], [20.0, 20.0]], array![0.0, 1.0]).unwrap();
    let t2 = TimeSeries::new(array![[5.0, 5.0], [8.0, 8.0]], array![0.0, 1.0]).unwrap();

    let t = t1.subtract(&t2).unwrap();

    assert_eq!(t.dependent_variable(), array![[5.0, 5.0], [12.0, 12.0]]);
    assert_eq!(t.times(), t1.times());
}

#[test]
fn test_can_concatenate_time_series() {
    let t1 = TimeSeries::new(array![[1.0, 2.0], [3.0, 4.0]], array![0.0, 1.0]).unwrap();
    let t2 = TimeSeries::new(array![[5.0, 6.0], [7.0, 8.0]], array![2.0, 3.0]).unwrap();

    let t = t1.concatenate(&t2).unwrap();

    assert_eq!(
        t.dependent_variable(),
        concatenate(Axis(0), &[t1.dependent_variable(), t2.dependent_variable()]).unwrap()
    );
    assert_eq!(
        t.times(),
        concatenate(Axis(0), &[t1.times(), t2.times()]).unwrap()
    );
}

#[test]
fn test_time_series_concatenation_overlap_error() {
    let t1 = TimeSeries::new(array![[1.0, 2.0], [3.0, 4.0]], array![0.0, 1.0]).unwrap();
    let t2 = TimeSeries::new(array![[5.0, 6.0], [7.0, 8.0]], array![1.0, 2.0]).unwrap();

    let err = t1.concatenate(&t2).unwrap_err();
    assert!(matches!(err, Error::NonContiguous { .. }));
    assert!(err.is_validation());
}

#[test]
fn test_timeseries_slicing() {
    let ts = four_rows();

    let subset = ts.slice(..2).unwrap();
    assert_eq!(subset.dependent_variable(), ts.dependent_variable().slice(s![..2, ..]));
    assert_eq!(subset.times(), ts.times().slice(s![..2]));

    let err = ts.get(10).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfBounds { index: 10, len: 4 }));
    assert!(err.is_out_of_bounds());
}

#[test]
fn test_timeseries_slice_assignment() {
    let mut ts = four_rows();
    let replacement = TimeSeries::new(array![[9.0, 9.0], [8.0, 8.0]], array![0.0, 1.0]).unwrap();

    ts.assign_slice(..2, &replacement).unwrap();

    assert_eq!(
        ts.dependent_variable(),
        array![[9.0, 9.0], [8.0, 8.0], [5.0, 6.0], [7.0, 8.0]]
    );
    assert_eq!(ts.times(), array![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_normalized_training_pipeline() {
    let times: Vec<f64> = (0..300).map(|i| i as f64 * 0.05).collect();
    let values: Vec<Vec<f64>> = times
        .iter()
        .map(|t| vec![3.0 + 2.0 * t.sin(), -1.0 + 0.5 * (2.0 * t).cos()])
        .collect();
    let series = TimeSeries::from_rows(values, times).unwrap();

    let train = series.slice(..280).unwrap();
    let truth = series.slice(280..).unwrap();

    let mut normalizer = Normalizer::new();
    let normalized = normalizer.normalize(&train).unwrap();

    let config = EsnConfig::new(80, 2)
        .regularization(1e-7)
        .washout(30)
        .include_input(true)
        .include_bias(true)
        .seed(11);
    let mut esn = EchoStateNetwork::new(config).unwrap();
    esn.train(&normalized, ReadoutSolver::PseudoInverse).unwrap();

    let forecast = normalizer.denormalize(&esn.predict(truth.len()).unwrap()).unwrap();
    let metrics = PredictionMetrics::compare(&truth, &forecast).unwrap();

    assert!(metrics.rmse < 0.25, "{metrics}");
    assert_abs_diff_eq!(forecast.start_time(), truth.start_time(), epsilon = 1e-9);
}

#[test]
fn test_train_rejects_wrong_channel_count() {
    let mut esn = EchoStateNetwork::new(EsnConfig::new(10, 3).seed(0)).unwrap();
    let err = esn
        .train(&cos_sin_series(), ReadoutSolver::NormalEquations)
        .unwrap_err();

    assert!(matches!(err, Error::DimensionMismatch { expected: 3, found: 2 }));
    assert!(matches!(esn.predict(1), Err(Error::NotTrained)));
}

#[test]
fn test_forecast_continues_context() {
    let series = cos_sin_series();
    let mut esn = EchoStateNetwork::new(EsnConfig::new(10, 2).seed(4)).unwrap();
    esn.train(&series, ReadoutSolver::NormalEquations).unwrap();

    let context = series.slice(..6).unwrap();
    let forecast = esn.forecast(&context, 4).unwrap();

    assert_eq!(forecast.times(), array![6.0, 7.0, 8.0, 9.0]);
    assert_eq!(context.concatenate(&forecast).unwrap().len(), 10);
}

#[test]
fn test_model_persistence() {
    let path = std::env::temp_dir().join(format!("esn_forecast_{}.bin", std::process::id()));
    let mut esn = EchoStateNetwork::new(EsnConfig::new(16, 2).seed(21)).unwrap();
    esn.train(&cos_sin_series(), ReadoutSolver::NormalEquations).unwrap();

    esn.save(&path).unwrap();
    let restored = EchoStateNetwork::load(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(restored.unwrap().predict(5).unwrap(), esn.predict(5).unwrap());
}
