//! Nonlinear conjugate-gradient minimizer
//!
//! Polack-Ribiere conjugate gradients with a line search that brackets and
//! refines the step length by quadratic and cubic polynomial
//! interpolation/extrapolation, stopping when the Wolfe-Powell conditions
//! hold. The initial step of each line search is guessed with the slope
//! ratio method. This is the classic `minimize` routine by C. E. Rasmussen.
//!
//! Notation follows the usual presentation of that routine: point 1 is the
//! start of the current line search, point 2 the current trial step and
//! point 3 the other end of the bracket. `f*` are function values, `d*`
//! directional derivatives along the search direction `s` and `z*` step
//! lengths (`z3` is kept relative to point 2).

use log::{debug, trace};
use ndarray::Array1;

use super::Objective;
use crate::error::{NetError, Result};

/// Minimum fraction of the initial slope a step must realize (Armijo).
pub const RHO: f64 = 0.01;
/// Required reduction of the slope magnitude (curvature condition).
pub const SIG: f64 = 0.5;
/// Don't re-evaluate within this fraction of either end of the bracket.
pub const INT: f64 = 0.1;
/// Extrapolate at most this many times the current step.
pub const EXT: f64 = 3.0;
/// Function evaluations allowed per line search.
pub const MAX_EVALS_PER_SEARCH: usize = 20;
/// Largest allowed growth of the initial step between line searches.
pub const RATIO: f64 = 100.0;

/// Tunables of [`minimize_with`] that may differ between calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgOptions {
    /// Expected reduction of the function value in the first line search,
    /// used to scale the very first step.
    pub reduction: f64,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self { reduction: 1.0 }
    }
}

/// Why a [`minimize`] run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The line-search or evaluation budget was used up.
    BudgetExhausted,
    /// Two line searches in a row failed; the point before the last one is returned.
    LineSearchFailed,
}

/// Outcome of a [`minimize`] run.
#[derive(Debug, Clone)]
pub struct Minimized {
    /// Best point found.
    pub x: Array1<f64>,
    /// Function value at the starting point.
    pub initial_loss: f64,
    /// Function value after every successful line search.
    pub losses: Vec<f64>,
    /// Line searches (positive budget) or function evaluations (negative budget) used.
    pub evaluations: usize,
    pub termination: Termination,
}

impl Minimized {
    /// Function value at `x`.
    pub fn final_loss(&self) -> f64 {
        self.losses.last().copied().unwrap_or(self.initial_loss)
    }
}

/// Minimizes `objective` starting from `x0`.
///
/// `length` is the budget: a positive value is the maximum number of line
/// searches, a negative value the maximum number of function evaluations
/// (its absolute value).
pub fn minimize<O>(objective: &mut O, x0: &Array1<f64>, length: i64) -> Result<Minimized>
where
    O: Objective + ?Sized,
{
    minimize_with(objective, x0, length, &CgOptions::default())
}

/// [`minimize`] with explicit options.
///
/// # Errors
///
/// Only errors returned by the objective itself, or a gradient whose length
/// differs from `x0`, abort the run. Failed line searches are not errors.
pub fn minimize_with<O>(
    objective: &mut O,
    x0: &Array1<f64>,
    length: i64,
    options: &CgOptions,
) -> Result<Minimized>
where
    O: Objective + ?Sized,
{
    let budget = usize::try_from(length.unsigned_abs()).unwrap_or(usize::MAX);
    let count_evaluations = length < 0;

    let mut x = x0.clone();
    let mut i = 0;
    let mut ls_failed = false;
    let mut losses = Vec::new();
    let mut termination = Termination::BudgetExhausted;

    let (mut f1, mut df1) = evaluate(objective, &x)?;
    let initial_loss = f1;
    if count_evaluations {
        i += 1;
    }
    // steepest descent to start with
    let mut s = -&df1;
    let mut d1 = -s.dot(&s);
    let mut z1 = options.reduction / (1.0 - d1);

    while i < budget {
        if !count_evaluations {
            i += 1;
        }

        let x_start = x.clone();
        let f_start = f1;
        let df_start = df1.clone();

        x.scaled_add(z1, &s);
        let (mut f2, mut df2) = evaluate(objective, &x)?;
        if count_evaluations {
            i += 1;
        }
        let mut d2 = df2.dot(&s);
        let (mut f3, mut d3, mut z3) = (f1, d1, -z1);
        let mut m = if count_evaluations {
            MAX_EVALS_PER_SEARCH.min(budget.saturating_sub(i))
        } else {
            MAX_EVALS_PER_SEARCH
        };
        let mut success = false;
        let mut limit = -1.0;

        loop {
            // tighten the bracket while either Wolfe-Powell condition fails
            while (f2 > f1 + z1 * RHO * d1 || d2 > -SIG * d1) && m > 0 {
                limit = z1;
                let mut z2 = if f2 > f1 {
                    // quadratic fit
                    z3 - (0.5 * d3 * z3 * z3) / (d3 * z3 + f2 - f3)
                } else {
                    // cubic fit
                    let a = 6.0 * (f2 - f3) / z3 + 3.0 * (d2 + d3);
                    let b = 3.0 * (f3 - f2) - z3 * (d3 + 2.0 * d2);
                    ((b * b - a * d2 * z3 * z3).sqrt() - b) / a
                };
                if !z2.is_finite() {
                    z2 = z3 / 2.0;
                }
                z2 = z2.min(INT * z3).max((1.0 - INT) * z3);
                z1 += z2;
                x.scaled_add(z2, &s);
                (f2, df2) = evaluate(objective, &x)?;
                m -= 1;
                if count_evaluations {
                    i += 1;
                }
                d2 = df2.dot(&s);
                z3 -= z2;
            }

            if f2 > f1 + z1 * RHO * d1 || d2 > -SIG * d1 {
                break;
            } else if d2 > SIG * d1 {
                success = true;
                break;
            } else if m == 0 {
                break;
            }

            // cubic extrapolation
            let a = 6.0 * (f2 - f3) / z3 + 3.0 * (d2 + d3);
            let b = 3.0 * (f3 - f2) - z3 * (d3 + 2.0 * d2);
            let mut z2 = -d2 * z3 * z3 / (b + (b * b - a * d2 * z3 * z3).sqrt());
            // A negative discriminant yields NaN here, the real-valued stand-in
            // for a complex root.
            if !z2.is_finite() || z2 < 0.0 {
                z2 = if limit < -0.5 {
                    z1 * (EXT - 1.0)
                } else {
                    (limit - z1) / 2.0
                };
            } else if limit > -0.5 && z2 + z1 > limit {
                z2 = (limit - z1) / 2.0;
            } else if limit < -0.5 && z2 + z1 > z1 * EXT {
                z2 = z1 * (EXT - 1.0);
            } else if z2 < -z3 * INT {
                z2 = -z3 * INT;
            } else if limit > -0.5 && z2 < (limit - z1) * (1.0 - INT) {
                z2 = (limit - z1) * (1.0 - INT);
            }

            f3 = f2;
            d3 = d2;
            z3 = -z2;
            z1 += z2;
            x.scaled_add(z2, &s);
            (f2, df2) = evaluate(objective, &x)?;
            m -= 1;
            if count_evaluations {
                i += 1;
            }
            d2 = df2.dot(&s);
        }

        if success {
            f1 = f2;
            losses.push(f1);
            trace!("line search {i}: loss {f1:.6e}");

            let (direction, slope) = polack_ribiere_direction(&s, &df1, &df2);
            s = direction;
            std::mem::swap(&mut df1, &mut df2);
            d2 = slope;
            z1 *= RATIO.min(d1 / (d2 - f64::MIN_POSITIVE));
            d1 = d2;
            ls_failed = false;
        } else {
            x = x_start;
            f1 = f_start;
            df1 = df_start;
            if ls_failed || i > budget {
                if ls_failed {
                    termination = Termination::LineSearchFailed;
                    debug!("two consecutive line searches failed after {i} steps, stopping");
                }
                break;
            }
            debug!("line search {i} failed, restarting along steepest descent");
            std::mem::swap(&mut df1, &mut df2);
            s = -&df1;
            d1 = -s.dot(&s);
            z1 = 1.0 / (1.0 - d1);
            ls_failed = true;
        }
    }

    Ok(Minimized {
        x,
        initial_loss,
        losses,
        evaluations: i,
        termination,
    })
}

/// Next search direction after a successful line search.
///
/// Returns `(direction, slope)` where `slope = gradientᵀ·direction`. The
/// Polack-Ribiere update is
/// `((gᵀg - g_prevᵀg) / (g_prevᵀg_prev)) · s - g`; when it is not a descent
/// direction (positive slope) the steepest descent direction `-g` is returned
/// instead.
pub fn polack_ribiere_direction(
    direction: &Array1<f64>,
    previous_gradient: &Array1<f64>,
    gradient: &Array1<f64>,
) -> (Array1<f64>, f64) {
    let beta = (gradient.dot(gradient) - previous_gradient.dot(gradient))
        / previous_gradient.dot(previous_gradient);
    let next = direction * beta - gradient;
    let slope = gradient.dot(&next);
    if slope > 0.0 {
        let steepest = -gradient;
        let slope = -steepest.dot(&steepest);
        (steepest, slope)
    } else {
        (next, slope)
    }
}

fn evaluate<O>(objective: &mut O, x: &Array1<f64>) -> Result<(f64, Array1<f64>)>
where
    O: Objective + ?Sized,
{
    let (loss, gradient) = objective.evaluate(x)?;
    if gradient.len() != x.len() {
        return Err(NetError::ShapeMismatch {
            what: "gradient",
            got: gradient.len(),
            expected: x.len(),
        });
    }
    Ok((loss, gradient))
}
