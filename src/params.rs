//! Conversion between per-layer parameters and one flat vector.
//!
//! The optimizer works on a single vector, so the network's weights and biases
//! are laid out back to back: for each layer in order, its weight matrix in
//! row-major order followed by its bias vector. Gradients use the same layout.

use ndarray::{Array1, Array2};

use crate::error::{NetError, Result};
use crate::layers::DenseLayer;
use crate::network::Network;

/// Concatenates every layer's weights and biases.
pub fn flatten(network: &Network) -> Array1<f64> {
    let mut flat = Vec::with_capacity(network.parameter_count());
    for layer in network.layers() {
        // `iter` walks in logical (row-major) order regardless of memory layout.
        flat.extend(layer.weights().iter().copied());
        flat.extend(layer.biases().iter().copied());
    }
    Array1::from_vec(flat)
}

/// Rebuilds layers shaped like `template`'s from a flat vector.
///
/// Activations are taken from the template. The result is a fresh set of
/// layers; the template is not modified.
///
/// # Errors
///
/// `ShapeMismatch` if `flat` does not hold exactly
/// `template.parameter_count()` values.
pub fn unflatten(flat: &Array1<f64>, template: &Network) -> Result<Vec<DenseLayer>> {
    let expected = template.parameter_count();
    if flat.len() != expected {
        return Err(NetError::ShapeMismatch {
            what: "flat parameters",
            got: flat.len(),
            expected,
        });
    }

    let values = flat.to_vec();
    let mut offset = 0;
    template
        .layers()
        .iter()
        .map(|layer| {
            let (rows, cols) = layer.weights().dim();
            let weights = Array2::from_shape_vec((rows, cols), values[offset..offset + rows * cols].to_vec())
                .map_err(|e| NetError::InvalidConfig(e.to_string()))?;
            offset += rows * cols;
            let biases = Array1::from_vec(values[offset..offset + cols].to_vec());
            offset += cols;
            DenseLayer::new(weights, biases, layer.activation())
        })
        .collect()
}

/// Flattens per-layer gradient blocks, ordered like the layers, in the
/// same layout as [`flatten`].
pub fn flatten_gradients(blocks: &[(Array2<f64>, Array1<f64>)]) -> Array1<f64> {
    let len = blocks.iter().map(|(dw, db)| dw.len() + db.len()).sum();
    let mut flat = Vec::with_capacity(len);
    for (dw, db) in blocks {
        flat.extend(dw.iter().copied());
        flat.extend(db.iter().copied());
    }
    Array1::from_vec(flat)
}

impl Network {
    /// Replaces every layer with one rebuilt from `flat`.
    pub fn set_parameters(&mut self, flat: &Array1<f64>) -> Result<()> {
        let layers = unflatten(flat, self)?;
        self.replace_layers(layers)
    }
}
