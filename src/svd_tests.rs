// src/svd_tests.rs
#![cfg(test)]
use crate::linalg_backends::LinAlgBackendProvider;
use crate::matmul::GramSide;
use crate::svd::*;
use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};

#[test]
fn default_config_is_valid_and_round_trips_through_json() {
    let config = SvdConfig::default();
    config.validate().unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: SvdConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let partial: SvdConfig = serde_json::from_str(r#"{"max_iterations": 5}"#).unwrap();
    assert_eq!(partial.max_iterations, 5);
    assert_eq!(partial.gram_side, GramSide::Auto);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = SvdConfig::default();
    config.max_iterations = 0;
    assert!(config.validate().is_err());

    let config = SvdConfig {
        epsilon: -1.0,
        ..SvdConfig::default()
    };
    assert!(config.validate().is_err());

    let config = SvdConfig {
        max_relative_error: f64::INFINITY,
        ..SvdConfig::default()
    };
    let svd = StreamingSvd::<f64>::new(config);
    assert!(svd.decompose(&Array2::eye(3)).is_err());
}

#[test]
fn stage_names() {
    assert_eq!(SvdStage::TransposeMultiply.to_string(), "TRANSPOSE-MULTIPLY");
    assert_eq!(SvdStage::Done.to_string(), "DONE");
}

#[test]
fn decomposes_diagonal_matrix() {
    let a = array![[3.0, 0.0], [0.0, 5.0]];
    let out = StreamingSvd::<f64>::new(SvdConfig::default()).decompose(&a).unwrap();
    assert_eq!(out.sorted_singular_values().len(), 2);
    assert_abs_diff_eq!(out.sorted_singular_values()[0], 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(out.sorted_singular_values()[1], 3.0, epsilon = 1e-9);
    assert!(!out.forced_termination);
    let rebuilt = out.reconstruct().unwrap();
    for (x, y) in rebuilt.iter().zip(a.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
    }
}

#[test]
fn rejects_small_and_non_finite_input() {
    let svd = StreamingSvd::with_backend(SvdConfig::default(), LinAlgBackendProvider::<f64>::new());
    assert!(svd.decompose(&Array2::zeros((1, 4))).is_err());
    assert!(svd.decompose(&array![[1.0, f64::NAN], [0.0, 1.0]]).is_err());
}

#[test]
fn iteration_cap_forces_termination() {
    // equal singular values never separate, but nearly equal ones take long
    let a = array![[1.0, 0.2, 0.0], [0.2, 1.0, 0.1], [0.0, 0.1, 0.999]];
    let config = SvdConfig {
        max_iterations: 3,
        max_relative_error: 1e-15,
        ..SvdConfig::default()
    };
    let out = StreamingSvd::<f64>::new(config).decompose(&a).unwrap();
    assert!(out.iterations <= 3);
    assert!(out.forced_termination);
}
