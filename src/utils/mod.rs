//! Shared utilities for the network and trainer
//!
//! Random number generation for initialization/shuffling and the activation
//! functions applied by each layer.

pub mod activations;
pub mod rng;

pub use activations::{sigmoid, sigmoid_derivative, Activation};
pub use rng::SimpleRng;
