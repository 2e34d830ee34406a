// Tests for the conjugate-gradient minimizer on analytic functions and on
// the backpropagation objective.

use approx::assert_relative_eq;
use cg_backprop::backprop::BackpropObjective;
use cg_backprop::optimizers::{minimize, minimize_with, CgOptions, Objective, Termination};
use cg_backprop::params::flatten;
use cg_backprop::utils::{Activation, SimpleRng};
use cg_backprop::{Batch, Loss, Network, Result};
use ndarray::{array, Array1};

// Counts evaluations of a wrapped objective.
struct Counting<O> {
    inner: O,
    calls: usize,
}

impl<O: Objective> Objective for Counting<O> {
    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        self.calls += 1;
        self.inner.evaluate(x)
    }
}

fn bowl(x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
    let scale = Array1::from_shape_fn(x.len(), |i| (i + 1) as f64);
    let f = (x * x * &scale).sum();
    Ok((f, 2.0 * x * &scale))
}

fn xor_batch() -> Batch {
    Batch::new(
        array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        array![[0.0], [1.0], [1.0], [0.0]],
    )
    .unwrap()
}

// ============================================================================
// Analytic objectives
// ============================================================================

mod analytic_tests {
    use super::*;

    #[test]
    fn test_bowl_reaches_minimum() {
        let mut objective = bowl;
        let start = Array1::from_elem(6, 1.0);
        let result = minimize(&mut objective, &start, 30).unwrap();

        for v in result.x.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-6);
        }
        assert!(result.final_loss() < 1e-10);
    }

    #[test]
    fn test_start_at_minimum_keeps_point() {
        let mut objective = bowl;
        let start = Array1::zeros(3);
        let result = minimize(&mut objective, &start, 10).unwrap();

        assert_eq!(result.x, start);
        assert_eq!(result.final_loss(), 0.0);
    }

    #[test]
    fn test_result_never_worse_than_start() {
        // sin has many local minima; the loss must still not go up
        let mut objective = |x: &Array1<f64>| -> Result<(f64, Array1<f64>)> {
            let f = x.mapv(|v| (3.0 * v).sin() + 0.1 * v * v).sum();
            let g = x.mapv(|v| 3.0 * (3.0 * v).cos() + 0.2 * v);
            Ok((f, g))
        };
        for start in [-2.0, -0.3, 0.7, 4.0] {
            let x0 = array![start, -start];
            let result = minimize(&mut objective, &x0, 5).unwrap();
            assert!(result.final_loss() <= result.initial_loss);
        }
    }

    #[test]
    fn test_reduction_option() {
        let mut objective = Counting { inner: bowl, calls: 0 };
        let options = CgOptions { reduction: 0.5 };
        let result = minimize_with(&mut objective, &array![1.0, -1.0], 20, &options).unwrap();

        assert!(result.final_loss() < 1e-8);
        assert!(objective.calls > 1);
    }

    #[test]
    fn test_nan_objective_stops_without_error() {
        let mut objective = |x: &Array1<f64>| -> Result<(f64, Array1<f64>)> {
            if x[0] == 1.0 {
                Ok((1.0, array![1.0]))
            } else {
                Ok((f64::NAN, array![f64::NAN]))
            }
        };
        let result = minimize(&mut objective, &array![1.0], 10).unwrap();

        assert_eq!(result.x, array![1.0]);
        assert_eq!(result.termination, Termination::LineSearchFailed);
        assert!(result.losses.is_empty());
    }

    #[test]
    fn test_evaluation_budget_counts_calls() {
        for budget in [1_i64, 2, 5, 13] {
            let mut objective = Counting { inner: bowl, calls: 0 };
            let result = minimize(&mut objective, &array![3.0, 1.0, -2.0], -budget).unwrap();

            assert!(objective.calls as i64 <= budget, "{} calls for budget {budget}", objective.calls);
            assert_eq!(result.evaluations, objective.calls);
        }
    }
}

// ============================================================================
// Backprop objective
// ============================================================================

mod backprop_tests {
    use super::*;

    #[test]
    fn test_minimizing_xor_loss() {
        let mut net = Network::from_sizes(&[2, 2, 1], &[Activation::Sigmoid; 3], &mut SimpleRng::new(1)).unwrap();
        let batch = xor_batch();
        let start = flatten(&net);

        let result = {
            let mut objective = BackpropObjective::new(&mut net, &batch, Loss::CrossEntropy);
            minimize(&mut objective, &start, 30).unwrap()
        };

        assert!(result.final_loss() < result.initial_loss);
        for pair in result.losses.windows(2) {
            assert!(pair[1] <= pair[0]);
        }

        net.set_parameters(&result.x).unwrap();
        let (loss, _) = cg_backprop::loss_and_gradient(&result.x, &mut net, &batch, Loss::CrossEntropy).unwrap();
        assert_relative_eq!(loss, result.final_loss(), epsilon = 1e-12);
    }

    #[test]
    fn test_budget_of_line_searches() {
        let mut net = Network::from_sizes(&[2, 3, 1], &[Activation::Sigmoid; 3], &mut SimpleRng::new(2)).unwrap();
        let batch = xor_batch();
        let start = flatten(&net);

        let mut objective = BackpropObjective::new(&mut net, &batch, Loss::CrossEntropy);
        let result = minimize(&mut objective, &start, 3).unwrap();
        assert!(result.losses.len() <= 3);
        assert_eq!(result.x.len(), start.len());
    }

    #[test]
    fn test_wrong_loss_is_an_error() {
        let mut net = Network::from_sizes(&[2, 1], &[Activation::Sigmoid; 2], &mut SimpleRng::new(2)).unwrap();
        let batch = xor_batch();
        let start = flatten(&net);

        let mut objective = BackpropObjective::new(&mut net, &batch, Loss::LinSquaredErr);
        assert!(minimize(&mut objective, &start, 3).is_err());
    }
}
