//! Feed-forward network: an ordered chain of dense layers.
//!
//! The network owns its layers and exposes the forward evaluator. Rows are
//! pushed through in fixed-size chunks so that the transient buffers of a
//! large batch stay bounded; chunking never changes the result.

use ndarray::{s, Array2, ArrayView2};

use crate::error::{NetError, Result};
use crate::layers::DenseLayer;
use crate::utils::{Activation, SimpleRng};

/// Rows evaluated at once by [`Network::forward`].
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Non-empty, dimensionally consistent sequence of layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<DenseLayer>,
}

impl Network {
    /// Wraps existing (pretrained) layers.
    ///
    /// # Errors
    ///
    /// `EmptyNetwork` for an empty list, `LayerMismatch` when the output size
    /// of a layer differs from the input size of the next.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        check_chain(&layers)?;
        Ok(Self { layers })
    }

    /// Builds a randomly initialized network.
    ///
    /// `sizes[0]` is the input dimension and `types[i]` is the activation of
    /// the units of size `sizes[i]`; `types[0]` therefore describes the input
    /// and is not used.
    pub fn from_sizes(sizes: &[usize], types: &[Activation], rng: &mut SimpleRng) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(NetError::EmptyNetwork);
        }
        if types.len() != sizes.len() {
            return Err(NetError::ShapeMismatch {
                what: "layer types",
                got: types.len(),
                expected: sizes.len(),
            });
        }

        let layers = sizes
            .windows(2)
            .zip(&types[1..])
            .map(|(dims, &activation)| DenseLayer::random(dims[0], dims[1], activation, rng))
            .collect::<Result<Vec<_>>>()?;

        Self::from_layers(layers)
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    /// Activation of the top layer, which decides the usable losses.
    pub fn output_activation(&self) -> Activation {
        self.layers[self.layers.len() - 1].activation()
    }

    /// Total number of weights and biases.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    /// Swaps in a complete new set of layers.
    ///
    /// The replacement must have exactly the current layer shapes.
    pub fn replace_layers(&mut self, layers: Vec<DenseLayer>) -> Result<()> {
        if layers.len() != self.layers.len() {
            return Err(NetError::ShapeMismatch {
                what: "layer count",
                got: layers.len(),
                expected: self.layers.len(),
            });
        }
        for (new, old) in layers.iter().zip(&self.layers) {
            if new.weights().dim() != old.weights().dim() {
                return Err(NetError::ShapeMismatch {
                    what: "layer parameters",
                    got: new.parameter_count(),
                    expected: old.parameter_count(),
                });
            }
        }
        self.layers = layers;
        Ok(())
    }

    /// Output of the top layer for every input row.
    pub fn forward(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.forward_chunked(inputs, DEFAULT_CHUNK_SIZE)
    }

    /// Like [`Network::forward`] with an explicit chunk size.
    pub fn forward_chunked(&self, inputs: ArrayView2<f64>, chunk_size: usize) -> Result<Array2<f64>> {
        self.check_inputs(inputs)?;
        let chunk_size = chunk_size.max(1);

        let mut output = Array2::zeros((inputs.nrows(), self.output_size()));
        let mut start = 0;
        while start < inputs.nrows() {
            let end = (start + chunk_size).min(inputs.nrows());
            let mut hidden = self.layers[0].forward(inputs.slice(s![start..end, ..]));
            for layer in &self.layers[1..] {
                hidden = layer.forward(hidden.view());
            }
            output.slice_mut(s![start..end, ..]).assign(&hidden);
            start = end;
        }

        Ok(output)
    }

    /// Every intermediate activation, starting with the input itself.
    ///
    /// Returns `num_layers() + 1` matrices; entry `i + 1` is the output of
    /// layer `i`.
    pub fn forward_with_activations(&self, inputs: ArrayView2<f64>) -> Result<Vec<Array2<f64>>> {
        self.check_inputs(inputs)?;

        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(inputs.to_owned());
        for layer in &self.layers {
            let previous = &activations[activations.len() - 1];
            let next = forward_layer_chunked(layer, previous.view(), DEFAULT_CHUNK_SIZE);
            activations.push(next);
        }

        Ok(activations)
    }

    fn check_inputs(&self, inputs: ArrayView2<f64>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(NetError::ShapeMismatch {
                what: "input columns",
                got: inputs.ncols(),
                expected: self.input_size(),
            });
        }
        Ok(())
    }
}

fn forward_layer_chunked(layer: &DenseLayer, inputs: ArrayView2<f64>, chunk_size: usize) -> Array2<f64> {
    let mut output = Array2::zeros((inputs.nrows(), layer.output_size()));
    let mut start = 0;
    while start < inputs.nrows() {
        let end = (start + chunk_size).min(inputs.nrows());
        let chunk = layer.forward(inputs.slice(s![start..end, ..]));
        output.slice_mut(s![start..end, ..]).assign(&chunk);
        start = end;
    }
    output
}

fn check_chain(layers: &[DenseLayer]) -> Result<()> {
    if layers.is_empty() {
        return Err(NetError::EmptyNetwork);
    }
    for (index, pair) in layers.windows(2).enumerate() {
        if pair[0].output_size() != pair[1].input_size() {
            return Err(NetError::LayerMismatch {
                index,
                output: pair[0].output_size(),
                input: pair[1].input_size(),
            });
        }
    }
    Ok(())
}
