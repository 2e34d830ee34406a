//! Optimizer abstractions for network training
//!
//! This module provides the [`Objective`] trait, the seam between a
//! differentiable function and the minimizers that drive it, and the
//! conjugate-gradient minimizer used for training.
//!
//! # Overview
//!
//! An objective maps a flat parameter vector to a scalar loss and the
//! gradient of that loss with respect to every parameter. Minimizers only
//! ever see flat vectors; turning them back into layers is the caller's job
//! (see [`crate::params`]).
//!
//! # Example
//!
//! ```
//! use cg_backprop::optimizers::minimize;
//! use ndarray::{array, Array1};
//!
//! // f(x) = |x - 3|^2
//! let mut objective = |x: &Array1<f64>| -> cg_backprop::Result<(f64, Array1<f64>)> {
//!     let diff = x - 3.0;
//!     Ok((diff.dot(&diff), 2.0 * &diff))
//! };
//! let result = minimize(&mut objective, &array![0.0, 10.0], 20).unwrap();
//! assert!((result.x[0] - 3.0).abs() < 1e-6);
//! ```

pub mod conjugate_gradient;

pub use conjugate_gradient::{minimize, minimize_with, polack_ribiere_direction, CgOptions, Minimized, Termination};

use ndarray::Array1;

use crate::error::Result;

/// A differentiable function of a flat parameter vector.
///
/// # Errors
///
/// Implementations return an error only for precondition violations (for
/// instance a vector of the wrong length). Minimizers propagate such errors
/// unchanged and abort.
pub trait Objective {
    /// Returns `(loss, gradient)` at `x`; the gradient has `x.len()` entries.
    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)>;
}

impl<F> Objective for F
where
    F: FnMut(&Array1<f64>) -> Result<(f64, Array1<f64>)>,
{
    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        self(x)
    }
}
