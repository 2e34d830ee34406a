//! Architecture configuration structures
//!
//! A network can be described in JSON in one of two ways: by its layer sizes
//! and activations (fresh random weights), or layer by layer with explicit
//! weights and biases (a pretrained network).

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::Deserialize;

use crate::error::{NetError, Result};
use crate::layers::DenseLayer;
use crate::network::Network;
use crate::utils::{Activation, SimpleRng};

/// One pretrained dense layer.
///
/// `weights` holds one row per input unit, each with one entry per output
/// unit.
///
/// # Example
///
/// ```json
/// {
///   "weights": [[0.5, -0.5], [0.25, 1.0]],
///   "biases": [0.0, 0.1],
///   "activation": "sigmoid"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl LayerConfig {
    fn input_size(&self) -> usize {
        self.weights.len()
    }

    fn output_size(&self) -> usize {
        self.biases.len()
    }

    fn to_layer(&self, index: usize) -> Result<DenseLayer> {
        let rows = self.input_size();
        let cols = self.output_size();
        if let Some(row) = self.weights.iter().position(|r| r.len() != cols) {
            return Err(NetError::InvalidConfig(format!(
                "Layer {}: weight row {} has {} entries, expected {}",
                index,
                row,
                self.weights[row].len(),
                cols
            )));
        }
        let flat: Vec<f64> = self.weights.iter().flatten().copied().collect();
        let weights = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| NetError::InvalidConfig(format!("Layer {index}: {e}")))?;
        DenseLayer::new(weights, Array1::from(self.biases.clone()), self.activation)
    }
}

/// Description of a whole network.
///
/// Exactly one of the two forms must be given.
///
/// # Examples
///
/// ```json
/// { "sizes": [2, 2, 1], "activations": ["sigmoid", "sigmoid", "sigmoid"] }
/// ```
///
/// `activations` has one entry per size; the first entry describes the
/// input layer and is ignored.
///
/// ```json
/// {
///   "layers": [
///     { "weights": [[1.0], [1.0]], "biases": [-0.5], "activation": "linear" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchitectureConfig {
    /// Unit counts from input to output.
    pub sizes: Option<Vec<usize>>,
    /// Activation per entry of `sizes`.
    pub activations: Option<Vec<Activation>>,
    /// Pretrained layers from input to output.
    pub layers: Option<Vec<LayerConfig>>,
}

impl ArchitectureConfig {
    /// Architecture with random initial weights.
    pub fn from_sizes(sizes: Vec<usize>, activations: Vec<Activation>) -> Self {
        Self {
            sizes: Some(sizes),
            activations: Some(activations),
            layers: None,
        }
    }

    /// Builds the network, drawing initial weights from `rng` when the
    /// architecture is given by sizes.
    pub fn build_network(&self, rng: &mut SimpleRng) -> Result<Network> {
        validate_architecture(self)?;
        match (&self.sizes, &self.activations, &self.layers) {
            (Some(sizes), Some(activations), None) => Network::from_sizes(sizes, activations, rng),
            (None, None, Some(layers)) => {
                let layers = layers
                    .iter()
                    .enumerate()
                    .map(|(i, layer)| layer.to_layer(i))
                    .collect::<Result<Vec<_>>>()?;
                Network::from_layers(layers)
            }
            _ => Err(form_error()),
        }
    }
}

fn form_error() -> NetError {
    NetError::InvalidConfig(
        "Architecture needs either 'sizes' with 'activations' or 'layers'".to_string(),
    )
}

/// Loads an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use cg_backprop::architecture::load_architecture;
/// use cg_backprop::utils::SimpleRng;
///
/// let arch = load_architecture("config/xor_architecture.json").unwrap();
/// let net = arch.build_network(&mut SimpleRng::new(1)).unwrap();
/// assert_eq!(net.input_size(), 2);
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Validates an architecture configuration.
///
/// Checks that exactly one form is used, that no layer is empty and that
/// consecutive layers connect.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    match (&config.sizes, &config.activations, &config.layers) {
        (Some(sizes), Some(activations), None) => {
            if sizes.len() < 2 {
                return Err(NetError::InvalidConfig(
                    "Architecture must have at least an input and an output size".to_string(),
                ));
            }
            if activations.len() != sizes.len() {
                return Err(NetError::ShapeMismatch {
                    what: "activations",
                    got: activations.len(),
                    expected: sizes.len(),
                });
            }
            if let Some(i) = sizes.iter().position(|&s| s == 0) {
                return Err(NetError::InvalidConfig(format!("Layer {i}: size must be positive")));
            }
            Ok(())
        }
        (None, None, Some(layers)) => {
            if layers.is_empty() {
                return Err(NetError::EmptyNetwork);
            }
            for (i, layer) in layers.iter().enumerate() {
                if layer.input_size() == 0 || layer.output_size() == 0 {
                    return Err(NetError::InvalidConfig(format!(
                        "Layer {i}: weights and biases must not be empty"
                    )));
                }
            }
            for (i, pair) in layers.windows(2).enumerate() {
                if pair[0].output_size() != pair[1].input_size() {
                    return Err(NetError::LayerMismatch {
                        index: i,
                        output: pair[0].output_size(),
                        input: pair[1].input_size(),
                    });
                }
            }
            Ok(())
        }
        _ => Err(form_error()),
    }
}
