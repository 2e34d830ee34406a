//! Feed-forward sigmoid networks trained by backpropagation with a
//! Polack-Ribiere conjugate-gradient minimizer.
//!
//! # Modules
//!
//! - `layers`: dense layers and their initialization
//! - `network`: layer stacks and the (chunked) forward pass
//! - `params`: flat parameter vector layout
//! - `backprop`: losses, mini-batches and the loss/gradient evaluation
//! - `optimizers`: the `Objective` seam and the conjugate-gradient minimizer
//! - `training`: the mini-batch training loop and error metrics
//! - `config`: training configuration structures
//! - `architecture`: architecture configuration and network building
//! - `utils`: shared utilities (RNG, activation functions)
//!
//! # Example
//!
//! ```
//! use cg_backprop::utils::{Activation, SimpleRng};
//! use cg_backprop::{train, Loss, Network, TrainingConfig};
//! use ndarray::array;
//!
//! let mut rng = SimpleRng::new(1);
//! let types = [Activation::Sigmoid; 3];
//! let mut net = Network::from_sizes(&[2, 2, 1], &types, &mut rng).unwrap();
//!
//! let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
//! let t = array![[0.0], [1.0], [1.0], [0.0]];
//! let config = TrainingConfig {
//!     max_iterations: 5,
//!     loss: Loss::CrossEntropy,
//!     seed: Some(1),
//!     ..TrainingConfig::default()
//! };
//! let report = train(&mut net, x.view(), t.view(), &config).unwrap();
//! assert_eq!(report.train_errors.len(), 6);
//! ```

pub mod architecture;
pub mod backprop;
pub mod config;
pub mod error;
pub mod layers;
pub mod network;
pub mod optimizers;
pub mod params;
pub mod training;
pub mod utils;

pub use backprop::{loss_and_gradient, Batch, Loss};
pub use config::TrainingConfig;
pub use error::{NetError, Result};
pub use layers::DenseLayer;
pub use network::Network;
pub use optimizers::minimize;
pub use training::{train, train_weighted, ErrorKind, Trainer, TrainingReport};
pub use utils::Activation;
