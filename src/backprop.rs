//! Loss and gradient computation by backpropagation
//!
//! [`loss_and_gradient`] is the objective the conjugate-gradient optimizer
//! minimizes. Given a flat parameter vector it installs those parameters in
//! the network, runs a forward pass that keeps every intermediate activation,
//! evaluates the loss, and propagates the error signal from the output layer
//! back to the input to obtain the exact gradient in the flat layout of
//! [`crate::params`].

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::Deserialize;

use crate::error::{NetError, Result};
use crate::network::Network;
use crate::optimizers::Objective;
use crate::params;
use crate::utils::Activation;

/// Training loss, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// `-(1/n) Σ_i w_i Σ_k [t ln a + (1 - t) ln(1 - a)]`, for sigmoid outputs.
    #[serde(alias = "crossEntropy")]
    CrossEntropy,
    /// `0.5 Σ_i w_i Σ_k (a - t)²`, for identity outputs.
    #[serde(alias = "linSquaredErr")]
    LinSquaredErr,
}

impl Loss {
    /// The only output activation this loss is defined for.
    pub fn required_activation(self) -> Activation {
        match self {
            Loss::CrossEntropy => Activation::Sigmoid,
            Loss::LinSquaredErr => Activation::Identity,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Loss::CrossEntropy => "cross_entropy",
            Loss::LinSquaredErr => "lin_squared_err",
        }
    }

    /// Fails with `UnsupportedLoss` unless the network's output activation
    /// matches this loss.
    pub fn check(self, network: &Network) -> Result<()> {
        let required = self.required_activation();
        let found = network.output_activation();
        if found != required {
            return Err(NetError::UnsupportedLoss {
                loss: self.name(),
                required: required.name(),
                found: found.name(),
            });
        }
        Ok(())
    }

    /// Loss value and the weighted output error signal `δ_L`.
    fn evaluate(
        self,
        output: &Array2<f64>,
        targets: ArrayView2<f64>,
        weights: ArrayView1<f64>,
    ) -> (f64, Array2<f64>) {
        let n = output.nrows() as f64;
        let mut delta = output - &targets;
        let per_sample: Array1<f64> = match self {
            Loss::CrossEntropy => {
                let mut terms = Array2::zeros(output.raw_dim());
                ndarray::Zip::from(&mut terms)
                    .and(output)
                    .and(targets)
                    .for_each(|term, &a, &t| *term = t * a.ln() + (1.0 - t) * (1.0 - a).ln());
                delta /= n;
                terms.sum_axis(Axis(1)) * (-1.0 / n)
            }
            Loss::LinSquaredErr => delta.mapv(|d| d * d).sum_axis(Axis(1)) * 0.5,
        };

        let loss = per_sample.dot(&weights);
        delta *= &weights.insert_axis(Axis(1));
        (loss, delta)
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Loss {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cross_entropy" | "crossEntropy" => Ok(Loss::CrossEntropy),
            "lin_squared_err" | "linSquaredErr" => Ok(Loss::LinSquaredErr),
            other => Err(NetError::InvalidConfig(format!(
                "unknown loss '{other}', expected 'cross_entropy' or 'lin_squared_err'"
            ))),
        }
    }
}

/// Inputs, targets and per-sample weights of one mini-batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    inputs: Array2<f64>,
    targets: Array2<f64>,
    sample_weights: Array1<f64>,
}

impl Batch {
    /// Batch with every sample weighted 1.
    pub fn new(inputs: Array2<f64>, targets: Array2<f64>) -> Result<Self> {
        let weights = Array1::ones(inputs.nrows());
        Self::with_weights(inputs, targets, weights)
    }

    /// Batch with explicit per-sample weights.
    pub fn with_weights(
        inputs: Array2<f64>,
        targets: Array2<f64>,
        sample_weights: Array1<f64>,
    ) -> Result<Self> {
        if targets.nrows() != inputs.nrows() {
            return Err(NetError::ShapeMismatch {
                what: "target rows",
                got: targets.nrows(),
                expected: inputs.nrows(),
            });
        }
        if sample_weights.len() != inputs.nrows() {
            return Err(NetError::ShapeMismatch {
                what: "sample weights",
                got: sample_weights.len(),
                expected: inputs.nrows(),
            });
        }
        Ok(Self {
            inputs,
            targets,
            sample_weights,
        })
    }

    /// Gathers the given rows of a dataset into a batch.
    pub fn select(
        inputs: ArrayView2<f64>,
        targets: ArrayView2<f64>,
        sample_weights: ArrayView1<f64>,
        rows: &[usize],
    ) -> Result<Self> {
        Self::with_weights(
            inputs.select(Axis(0), rows),
            targets.select(Axis(0), rows),
            sample_weights.select(Axis(0), rows),
        )
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn targets(&self) -> &Array2<f64> {
        &self.targets
    }

    pub fn sample_weights(&self) -> &Array1<f64> {
        &self.sample_weights
    }
}

/// Loss and flat gradient of `network` with parameters `flat_params` on `batch`.
///
/// The candidate parameters are written into `network` (its layers are
/// replaced), so after the call the network holds the last evaluated point.
/// Calling twice with the same vector gives identical results.
///
/// # Errors
///
/// `ShapeMismatch` if `flat_params` or the batch do not fit the network,
/// `UnsupportedLoss` if `loss` does not match the output activation.
pub fn loss_and_gradient(
    flat_params: &Array1<f64>,
    network: &mut Network,
    batch: &Batch,
    loss: Loss,
) -> Result<(f64, Array1<f64>)> {
    loss.check(network)?;
    if batch.targets.ncols() != network.output_size() {
        return Err(NetError::ShapeMismatch {
            what: "target columns",
            got: batch.targets.ncols(),
            expected: network.output_size(),
        });
    }

    network.set_parameters(flat_params)?;
    let activations = network.forward_with_activations(batch.inputs.view())?;
    let output = &activations[activations.len() - 1];
    let (value, mut delta) = loss.evaluate(output, batch.targets.view(), batch.sample_weights.view());

    let layers = network.layers();
    let mut blocks = Vec::with_capacity(layers.len());
    for i in (0..layers.len()).rev() {
        let input = &activations[i];
        let fan_in = input.ncols();

        // bias trick: a constant-one column turns the bias into an extra weight row
        let mut augmented = Array2::ones((input.nrows(), fan_in + 1));
        augmented.slice_mut(s![.., ..fan_in]).assign(input);
        let full = augmented.t().dot(&delta);

        let weight_grad = full.slice(s![..fan_in, ..]).to_owned();
        let bias_grad = full.row(fan_in).to_owned();
        blocks.push((weight_grad, bias_grad));

        if i > 0 {
            let propagated = delta.dot(&layers[i].augmented_weights().t());
            let mut previous = propagated.slice(s![.., ..fan_in]).to_owned();
            layers[i - 1]
                .activation()
                .scale_by_derivative(&mut previous, input);
            delta = previous;
        }
    }
    blocks.reverse();

    Ok((value, params::flatten_gradients(&blocks)))
}

/// [`loss_and_gradient`] bound to a network, batch and loss, usable as an
/// optimizer [`Objective`].
pub struct BackpropObjective<'a> {
    network: &'a mut Network,
    batch: &'a Batch,
    loss: Loss,
}

impl<'a> BackpropObjective<'a> {
    pub fn new(network: &'a mut Network, batch: &'a Batch, loss: Loss) -> Self {
        Self {
            network,
            batch,
            loss,
        }
    }
}

impl Objective for BackpropObjective<'_> {
    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        loss_and_gradient(x, self.network, self.batch, self.loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::DenseLayer;
    use crate::utils::SimpleRng;
    use ndarray::array;

    fn single_unit_net(activation: Activation) -> Network {
        let layer = DenseLayer::new(array![[0.5], [-0.25]], array![0.1], activation).unwrap();
        Network::from_layers(vec![layer]).unwrap()
    }

    #[test]
    fn test_lin_squared_err_value() {
        let mut net = single_unit_net(Activation::Identity);
        let flat = params::flatten(&net);
        let batch = Batch::new(array![[1.0, 0.0], [0.0, 2.0]], array![[0.0], [0.0]]).unwrap();

        // outputs 0.6 and -0.4
        let (loss, grad) = loss_and_gradient(&flat, &mut net, &batch, Loss::LinSquaredErr).unwrap();
        assert!((loss - 0.5 * (0.36 + 0.16)).abs() < 1e-12);
        // dW = X^T (a - t) = [0.6, -0.8], db = 0.6 - 0.4
        assert!((grad[0] - 0.6).abs() < 1e-12);
        assert!((grad[1] + 0.8).abs() < 1e-12);
        assert!((grad[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_sample_weights_scale_loss() {
        let mut net = single_unit_net(Activation::Identity);
        let flat = params::flatten(&net);
        let x = array![[1.0, 0.0], [0.0, 2.0]];
        let t = array![[0.0], [0.0]];

        let unit = Batch::new(x.clone(), t.clone()).unwrap();
        let weighted = Batch::with_weights(x, t, array![2.0, 0.0]).unwrap();
        let (l1, _) = loss_and_gradient(&flat, &mut net, &unit, Loss::LinSquaredErr).unwrap();
        let (l2, g2) = loss_and_gradient(&flat, &mut net, &weighted, Loss::LinSquaredErr).unwrap();

        assert!((l1 - 0.26).abs() < 1e-12);
        assert!((l2 - 0.36).abs() < 1e-12);
        assert!((g2[2] - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_cross_entropy_at_half() {
        let layer = DenseLayer::new(array![[0.0]], array![0.0], Activation::Sigmoid).unwrap();
        let mut net = Network::from_layers(vec![layer]).unwrap();
        let flat = params::flatten(&net);
        let batch = Batch::new(array![[1.0], [1.0]], array![[1.0], [0.0]]).unwrap();

        let (loss, grad) = loss_and_gradient(&flat, &mut net, &batch, Loss::CrossEntropy).unwrap();
        // both rows predict 0.5: loss = -(1/2)(ln 0.5 + ln 0.5)
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
        // δ = ((0.5 - 1) + (0.5 - 0)) / 2 = 0
        assert!(grad.iter().all(|g| g.abs() < 1e-12));
    }

    #[test]
    fn test_single_output_bias_gradient_shape() {
        let types = [Activation::Sigmoid; 3];
        let mut net = Network::from_sizes(&[3, 4, 1], &types, &mut SimpleRng::new(8)).unwrap();
        let flat = params::flatten(&net);
        let batch = Batch::new(Array2::from_elem((5, 3), 0.3), Array2::from_elem((5, 1), 1.0)).unwrap();

        let (_, grad) = loss_and_gradient(&flat, &mut net, &batch, Loss::CrossEntropy).unwrap();
        assert_eq!(grad.len(), flat.len());
        assert_eq!(grad.len(), 3 * 4 + 4 + 4 + 1);
    }

    #[test]
    fn test_unsupported_pairing_rejected() {
        let mut net = single_unit_net(Activation::Identity);
        let flat = params::flatten(&net);
        let batch = Batch::new(array![[1.0, 0.0]], array![[1.0]]).unwrap();

        let err = loss_and_gradient(&flat, &mut net, &batch, Loss::CrossEntropy).unwrap_err();
        assert!(matches!(err, NetError::UnsupportedLoss { .. }));
    }

    #[test]
    fn test_target_width_checked() {
        let mut net = single_unit_net(Activation::Identity);
        let flat = params::flatten(&net);
        let batch = Batch::new(array![[1.0, 0.0]], array![[1.0, 2.0]]).unwrap();

        let err = loss_and_gradient(&flat, &mut net, &batch, Loss::LinSquaredErr).unwrap_err();
        assert!(matches!(err, NetError::ShapeMismatch { what: "target columns", .. }));
    }

    #[test]
    fn test_candidate_written_into_network() {
        let mut net = single_unit_net(Activation::Identity);
        let candidate = array![1.0, 2.0, 3.0];
        let batch = Batch::new(array![[1.0, 1.0]], array![[0.0]]).unwrap();

        loss_and_gradient(&candidate, &mut net, &batch, Loss::LinSquaredErr).unwrap();
        assert_eq!(params::flatten(&net), candidate);
    }

    #[test]
    fn test_batch_shape_checks() {
        assert!(Batch::new(Array2::zeros((3, 2)), Array2::zeros((2, 1))).is_err());
        assert!(Batch::with_weights(Array2::zeros((3, 2)), Array2::zeros((3, 1)), Array1::ones(2)).is_err());
    }

    #[test]
    fn test_loss_names() {
        assert_eq!("crossEntropy".parse::<Loss>().unwrap(), Loss::CrossEntropy);
        assert_eq!("lin_squared_err".parse::<Loss>().unwrap(), Loss::LinSquaredErr);
        assert!("softmax".parse::<Loss>().is_err());
    }
}
