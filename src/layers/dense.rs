//! Dense (fully connected) layer implementation
//!
//! A `DenseLayer` performs `output = activation(input × weights + biases)`.
//! Layers are immutable values: training produces new layers from a flat
//! parameter vector instead of editing weights in place.

use ndarray::{s, Array1, Array2, ArrayView2};

use crate::error::{NetError, Result};
use crate::utils::{Activation, SimpleRng};

/// Scale of the gaussian used for freshly initialized weights.
pub const INIT_WEIGHT_SCALE: f64 = 0.1;
/// Constant every freshly initialized bias starts from.
pub const INIT_BIAS: f64 = -0.4;

/// Dense layer with weights, biases and an activation.
///
/// # Fields
///
/// * `weights` - Weight matrix (input_size × output_size)
/// * `biases` - Bias vector (output_size)
/// * `activation` - Nonlinearity applied to the affine output
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
}

impl DenseLayer {
    /// Builds a layer from existing (e.g. pretrained) parameters.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the bias length differs from the weight column count,
    /// `InvalidConfig` if the layer has no inputs or no outputs.
    pub fn new(weights: Array2<f64>, biases: Array1<f64>, activation: Activation) -> Result<Self> {
        if weights.nrows() == 0 || weights.ncols() == 0 {
            return Err(NetError::InvalidConfig(format!(
                "layer dimensions must be positive, got {}x{}",
                weights.nrows(),
                weights.ncols()
            )));
        }
        if biases.len() != weights.ncols() {
            return Err(NetError::ShapeMismatch {
                what: "layer biases",
                got: biases.len(),
                expected: weights.ncols(),
            });
        }

        Ok(Self {
            weights,
            biases,
            activation,
        })
    }

    /// Creates a randomly initialized layer.
    ///
    /// Weights are drawn from `INIT_WEIGHT_SCALE * N(0, 1)` and every bias is
    /// set to `INIT_BIAS`, which starts sigmoid units slightly below 0.5.
    pub fn random(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        let weights = Array2::from_shape_simple_fn((input_size, output_size), || {
            INIT_WEIGHT_SCALE * rng.next_gaussian()
        });
        let biases = Array1::from_elem(output_size, INIT_BIAS);
        Self::new(weights, biases, activation)
    }

    /// Get the input size of the layer.
    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    /// Get the output size of the layer.
    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Get the number of trainable parameters.
    ///
    /// Returns input_size × output_size (weights) + output_size (biases).
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.biases
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Maps a block of rows through the layer.
    pub fn forward(&self, input: ArrayView2<f64>) -> Array2<f64> {
        let mut output = input.dot(&self.weights);
        output += &self.biases;
        self.activation.apply_inplace(output.view_mut());
        output
    }

    /// Weight matrix with the bias appended as an extra last row,
    /// i.e. `[W; b]` with shape (input_size + 1) × output_size.
    pub fn augmented_weights(&self) -> Array2<f64> {
        let mut augmented = Array2::zeros((self.input_size() + 1, self.output_size()));
        augmented
            .slice_mut(s![..self.input_size(), ..])
            .assign(&self.weights);
        augmented.row_mut(self.input_size()).assign(&self.biases);
        augmented
    }
}
