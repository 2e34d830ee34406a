//! Mini-batch training loop
//!
//! Each iteration shuffles the training rows, cuts them into mini-batches and
//! runs a few conjugate-gradient line searches per batch on the
//! backpropagation objective. Progress (train and optional validation error)
//! is reported through the `log` facade before every iteration and once at
//! the end.

use log::{info, trace};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Deserialize;

use crate::backprop::{Batch, BackpropObjective};
use crate::config::TrainingConfig;
use crate::error::{NetError, Result};
use crate::network::Network;
use crate::optimizers::minimize;
use crate::params;
use crate::utils::SimpleRng;

/// Metric used to report how well the network fits a data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Weighted fraction of rows whose predicted argmax column differs from
    /// the target's.
    Classification,
    /// Weighted mean Euclidean distance between prediction and target rows.
    Reconstruction,
}

/// Error of `network` on `inputs` against `targets`, normalized by the total
/// sample weight.
pub fn prediction_error(
    network: &Network,
    inputs: ArrayView2<f64>,
    targets: ArrayView2<f64>,
    weights: ArrayView1<f64>,
    kind: ErrorKind,
) -> Result<f64> {
    check_rows(inputs, targets)?;
    if weights.len() != inputs.nrows() {
        return Err(NetError::ShapeMismatch {
            what: "sample weights",
            got: weights.len(),
            expected: inputs.nrows(),
        });
    }
    let total_weight = weights.sum();
    if total_weight <= 0.0 {
        return Err(NetError::InvalidConfig(
            "sample weights must have a positive sum".to_string(),
        ));
    }

    let predictions = network.forward(inputs)?;
    let mut error = 0.0;
    for ((prediction, target), &weight) in predictions.rows().into_iter().zip(targets.rows()).zip(weights) {
        error += match kind {
            ErrorKind::Classification => {
                if argmax(prediction) != argmax(target) {
                    weight
                } else {
                    0.0
                }
            }
            ErrorKind::Reconstruction => {
                let distance = prediction
                    .iter()
                    .zip(target.iter())
                    .map(|(p, t)| (p - t) * (p - t))
                    .sum::<f64>()
                    .sqrt();
                distance * weight
            }
        };
    }

    Ok(error / total_weight)
}

/// First index of the largest entry.
fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = i;
        }
    }
    best
}

/// Errors recorded during [`Trainer::train`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    /// Training error before every iteration, plus the final one.
    pub train_errors: Vec<f64>,
    /// Validation error at the same points (empty without validation data).
    pub valid_errors: Vec<f64>,
    /// Loss reached on every mini-batch, in training order.
    pub batch_losses: Vec<f64>,
}

/// Trains `network` on `data`/`targets` with unit sample weights.
pub fn train(
    network: &mut Network,
    data: ArrayView2<f64>,
    targets: ArrayView2<f64>,
    config: &TrainingConfig,
) -> Result<TrainingReport> {
    Trainer::new(config.clone()).train(network, data, targets)
}

/// [`train`] with a caller-supplied weight per training row.
pub fn train_weighted(
    network: &mut Network,
    data: ArrayView2<f64>,
    targets: ArrayView2<f64>,
    sample_weights: Array1<f64>,
    config: &TrainingConfig,
) -> Result<TrainingReport> {
    Trainer::new(config.clone())
        .with_sample_weights(sample_weights)
        .train(network, data, targets)
}

/// Training driver with optional validation data and sample weights.
pub struct Trainer<'v> {
    config: TrainingConfig,
    validation: Option<(ArrayView2<'v, f64>, ArrayView2<'v, f64>)>,
    sample_weights: Option<Array1<f64>>,
    rng: SimpleRng,
}

impl<'v> Trainer<'v> {
    pub fn new(config: TrainingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SimpleRng::new(seed),
            None => SimpleRng::from_time(),
        };
        Self {
            config,
            validation: None,
            sample_weights: None,
            rng,
        }
    }

    /// Reports the error on this data set alongside the training error.
    pub fn with_validation(mut self, inputs: ArrayView2<'v, f64>, targets: ArrayView2<'v, f64>) -> Self {
        self.validation = Some((inputs, targets));
        self
    }

    /// Weights each training row's contribution to the loss and the error.
    pub fn with_sample_weights(mut self, weights: Array1<f64>) -> Self {
        self.sample_weights = Some(weights);
        self
    }

    /// Runs `config.max_iterations` epochs.
    ///
    /// # Errors
    ///
    /// Shape and configuration problems are reported before any training
    /// step. Line-search failures on a batch are not errors; that batch
    /// simply stops improving.
    pub fn train(
        &mut self,
        network: &mut Network,
        data: ArrayView2<f64>,
        targets: ArrayView2<f64>,
    ) -> Result<TrainingReport> {
        self.config.validate()?;
        self.config.loss.check(network)?;
        check_dataset(network, data, targets)?;
        if let Some((valid_x, valid_t)) = self.validation {
            check_dataset(network, valid_x, valid_t)?;
        }

        let n = data.nrows();
        if n == 0 {
            return Err(NetError::InvalidConfig("training data is empty".to_string()));
        }
        let weights = match &self.sample_weights {
            Some(w) if w.len() != n => {
                return Err(NetError::ShapeMismatch {
                    what: "sample weights",
                    got: w.len(),
                    expected: n,
                })
            }
            Some(w) => w.clone(),
            None => Array1::ones(n),
        };

        // the training error is estimated on a fixed random subset of rows
        let estimate_rows: Vec<usize> = self
            .rng
            .permutation(n)
            .into_iter()
            .take(self.config.batch_size.min(n))
            .collect();
        let estimate = Batch::select(data, targets, weights.view(), &estimate_rows)?;

        let mut report = TrainingReport::default();
        info!("Starting {} iterations of backprop.", self.config.max_iterations);
        for iteration in 0..self.config.max_iterations {
            let label = format!("Iteration {:3}", iteration + 1);
            self.record_errors(network, &estimate, &label, &mut report)?;
            self.run_epoch(network, data, targets, weights.view(), &mut report)?;
        }
        self.record_errors(network, &estimate, "Final        ", &mut report)?;

        Ok(report)
    }

    fn run_epoch(
        &mut self,
        network: &mut Network,
        data: ArrayView2<f64>,
        targets: ArrayView2<f64>,
        weights: ArrayView1<f64>,
        report: &mut TrainingReport,
    ) -> Result<()> {
        let n = data.nrows();
        let batch_size = self.config.batch_size;
        let line_searches = i64::try_from(self.config.line_searches)
            .map_err(|_| NetError::InvalidConfig("line_searches is too large".to_string()))?;
        let index = self.rng.permutation(n);

        let mut start = 0;
        while start < n {
            // a batch that would leave an undersized remainder takes it along
            let end = if start + 2 * batch_size > n {
                n
            } else {
                start + batch_size
            };
            let batch = Batch::select(data, targets, weights, &index[start..end])?;

            let initial = params::flatten(network);
            let result = {
                let mut objective = BackpropObjective::new(network, &batch, self.config.loss);
                minimize(&mut objective, &initial, line_searches)?
            };
            network.set_parameters(&result.x)?;
            trace!(
                "batch {}..{}: loss {:.6} -> {:.6}",
                start,
                end,
                result.initial_loss,
                result.final_loss()
            );
            report.batch_losses.push(result.final_loss());

            start = end;
        }
        Ok(())
    }

    fn record_errors(
        &self,
        network: &Network,
        estimate: &Batch,
        label: &str,
        report: &mut TrainingReport,
    ) -> Result<()> {
        let kind = self.config.error_kind;
        let train_err = prediction_error(
            network,
            estimate.inputs().view(),
            estimate.targets().view(),
            estimate.sample_weights().view(),
            kind,
        )?;
        report.train_errors.push(train_err);

        match self.validation {
            Some((valid_x, valid_t)) => {
                let ones = Array1::ones(valid_x.nrows());
                let valid_err = prediction_error(network, valid_x, valid_t, ones.view(), kind)?;
                report.valid_errors.push(valid_err);
                info!("{label}: TrainErr = {train_err:4.3}, ValidErr = {valid_err:4.3}");
            }
            None => info!("{label}: TrainErr = {train_err:4.3}"),
        }
        Ok(())
    }
}

fn check_rows(inputs: ArrayView2<f64>, targets: ArrayView2<f64>) -> Result<()> {
    if targets.nrows() != inputs.nrows() {
        return Err(NetError::ShapeMismatch {
            what: "target rows",
            got: targets.nrows(),
            expected: inputs.nrows(),
        });
    }
    Ok(())
}

fn check_dataset(network: &Network, inputs: ArrayView2<f64>, targets: ArrayView2<f64>) -> Result<()> {
    check_rows(inputs, targets)?;
    if inputs.ncols() != network.input_size() {
        return Err(NetError::ShapeMismatch {
            what: "input columns",
            got: inputs.ncols(),
            expected: network.input_size(),
        });
    }
    if targets.ncols() != network.output_size() {
        return Err(NetError::ShapeMismatch {
            what: "target columns",
            got: targets.ncols(),
            expected: network.output_size(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Activation;
    use ndarray::{array, Array2};

    fn identity_net() -> Network {
        let layer = crate::layers::DenseLayer::new(
            array![[1.0, 0.0], [0.0, 1.0]],
            array![0.0, 0.0],
            Activation::Identity,
        )
        .unwrap();
        Network::from_layers(vec![layer]).unwrap()
    }

    #[test]
    fn test_classification_error() {
        let net = identity_net();
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0]];
        let t = array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let w = array![1.0, 1.0, 2.0];

        let err = prediction_error(&net, x.view(), t.view(), w.view(), ErrorKind::Classification).unwrap();
        assert!((err - 3.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_reconstruction_error() {
        let net = identity_net();
        let x = array![[3.0, 4.0], [1.0, 1.0]];
        let t = array![[0.0, 0.0], [1.0, 1.0]];
        let w = array![1.0, 1.0];

        let err = prediction_error(&net, x.view(), t.view(), w.view(), ErrorKind::Reconstruction).unwrap();
        assert!((err - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_argmax_takes_first_maximum() {
        assert_eq!(argmax(array![0.2, 0.7, 0.7].view()), 1);
        assert_eq!(argmax(array![5.0].view()), 0);
    }

    #[test]
    fn test_report_lengths() {
        let types = [Activation::Sigmoid, Activation::Sigmoid, Activation::Identity];
        let mut net = Network::from_sizes(&[2, 3, 2], &types, &mut SimpleRng::new(4)).unwrap();
        let x = Array2::from_shape_fn((300, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64 / 11.0);
        let t = x.clone();
        let config = TrainingConfig {
            max_iterations: 2,
            error_kind: ErrorKind::Reconstruction,
            seed: Some(1),
            ..TrainingConfig::default()
        };

        let report = Trainer::new(config)
            .with_validation(x.view(), t.view())
            .train(&mut net, x.view(), t.view())
            .unwrap();

        assert_eq!(report.train_errors.len(), 3);
        assert_eq!(report.valid_errors.len(), 3);
        // 300 rows at 128 per batch: 0..128 and 128..300
        assert_eq!(report.batch_losses.len(), 4);
    }

    #[test]
    fn test_shape_errors_are_fatal() {
        let types = [Activation::Sigmoid, Activation::Sigmoid];
        let mut net = Network::from_sizes(&[2, 1], &types, &mut SimpleRng::new(4)).unwrap();
        let config = TrainingConfig {
            loss: crate::backprop::Loss::CrossEntropy,
            seed: Some(1),
            ..TrainingConfig::default()
        };

        let x = Array2::zeros((4, 2));
        assert!(train(&mut net, x.view(), Array2::<f64>::zeros((3, 1)).view(), &config).is_err());
        assert!(train(&mut net, x.view(), Array2::<f64>::zeros((4, 2)).view(), &config).is_err());

        let wrong_loss = TrainingConfig {
            loss: crate::backprop::Loss::LinSquaredErr,
            ..config
        };
        let err = train(&mut net, x.view(), Array2::<f64>::zeros((4, 1)).view(), &wrong_loss).unwrap_err();
        assert!(matches!(err, NetError::UnsupportedLoss { .. }));
    }
}
