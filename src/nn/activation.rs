//! Activation functions
//!
//! The classifier uses exactly two nonlinearities: ReLU inside the hidden
//! blocks and an element-wise sigmoid on the output layer, one independent
//! probability per risk category.

use ndarray::Array2;

/// Rectified linear unit: max(0, x).
pub fn relu(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| v.max(0.0))
}

/// ReLU derivative as a 0/1 mask. Zero at the origin.
pub fn relu_mask(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

/// Element-wise logistic sigmoid: 1 / (1 + exp(-x)).
pub fn sigmoid(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}
