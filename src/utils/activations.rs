//! Activation functions for neural networks
//!
//! Two nonlinearities are supported, as a closed set:
//! - Sigmoid (logistic), used for hidden layers and probabilistic outputs
//! - Identity, used for linear output layers (historically called "gaussian")

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayViewMut2};
use serde::Deserialize;

use crate::error::NetError;

/// Sigmoid activation function.
///
/// Returns the sigmoid of the input: 1 / (1 + exp(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative assuming x = sigmoid(z).
///
/// Returns the derivative: x * (1 - x)
pub fn sigmoid_derivative(x: f64) -> f64 {
    x * (1.0 - x)
}

/// Nonlinearity applied after a layer's affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Sigmoid,
    #[serde(alias = "gaussian", alias = "linear")]
    Identity,
}

impl Activation {
    /// Applies the activation to every element in place.
    pub fn apply_inplace(self, mut z: ArrayViewMut2<f64>) {
        match self {
            Activation::Sigmoid => z.mapv_inplace(sigmoid),
            Activation::Identity => {}
        }
    }

    /// Multiplies an error signal by the activation derivative, expressed in
    /// terms of the layer's output `a`.
    ///
    /// Identity leaves `delta` untouched.
    pub fn scale_by_derivative(self, delta: &mut Array2<f64>, a: &Array2<f64>) {
        match self {
            Activation::Sigmoid => delta.zip_mut_with(a, |d, &a| *d *= sigmoid_derivative(a)),
            Activation::Identity => {}
        }
    }

    /// Name used in configuration files and log lines.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Sigmoid => "sigmoid",
            Activation::Identity => "identity",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sigmoid" | "logistic" => Ok(Activation::Sigmoid),
            "identity" | "gaussian" | "linear" => Ok(Activation::Identity),
            other => Err(NetError::InvalidConfig(format!(
                "unknown activation '{other}', expected 'sigmoid' or 'identity'"
            ))),
        }
    }
}
