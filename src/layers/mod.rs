//! Layer abstractions for neural networks
//!
//! The only learnable unit is the dense layer: an affine transform followed
//! by an activation.

pub mod dense;

pub use dense::DenseLayer;
