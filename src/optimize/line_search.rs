//! Step length selection along a search direction.
//!
//! Both searches enforce the Armijo sufficient-decrease condition
//! `f(x + a d) <= f(x) + c1 a (d . g)` with `c1 = 0.1`.

use tracing::warn;

use super::Objective;
use crate::error::{OptimizationError, Result};
use crate::math::VectorN;

/// Sufficient decrease constant.
const ARMIJO_C1: f64 = 1e-1;

/// Reduction factor applied by the backtracking search.
const BACKTRACK_FACTOR: f64 = 0.5;

/// Quadratic refinements attempted before falling back to backtracking.
const MAX_QUADRATIC_REFINEMENTS: usize = 10;

fn satisfies_armijo(trial: f64, value: f64, alpha: f64, slope: f64) -> bool {
    // NaN trial values never satisfy the condition
    trial <= value + ARMIJO_C1 * alpha * slope
}

/// Armijo backtracking line search starting at a unit step.
///
/// # Errors
///
/// Returns [`OptimizationError::LineSearchFailed`] when the step length
/// shrinks to working precision.
pub fn backtracking<O>(
    objective: &O,
    value: f64,
    x: &VectorN,
    grad: &VectorN,
    direction: &VectorN,
) -> Result<f64>
where
    O: Objective + ?Sized,
{
    let slope = direction.dot(grad);
    let mut alpha = 1.0;
    while !satisfies_armijo(objective.value(&(x + direction * alpha)), value, alpha, slope) {
        alpha *= BACKTRACK_FACTOR;
        if alpha < 10.0 * f64::EPSILON {
            return Err(OptimizationError::LineSearchFailed(
                "step length close to working precision".into(),
            )
            .into());
        }
    }
    Ok(alpha)
}

/// Line search placing the step at the minimum of the quadratic
/// `phi(t) = a t^2 + b t + c` through `f(x)`, the directional derivative
/// and `f(x + alpha_in d)`.
///
/// Falls back to [`backtracking`] when the model is not convex or more than
/// ten refinements fail the Armijo test.
///
/// # Errors
///
/// Returns an error if the fallback backtracking search fails.
pub fn quadratic_approximation<O>(
    objective: &O,
    value: f64,
    x: &VectorN,
    grad: &VectorN,
    direction: &VectorN,
    alpha_in: f64,
) -> Result<f64>
where
    O: Objective + ?Sized,
{
    let c = value;
    let b = direction.dot(grad);
    let eval = |alpha: f64| objective.value(&(x + direction * alpha));
    let minimizer = |alpha: f64, trial: f64| {
        let a = (trial - b * alpha - c) / (alpha * alpha);
        let next = -b / (2.0 * a);
        (a > 0.0 && next.is_finite() && next > 0.0).then_some(next)
    };

    let start = if alpha_in.is_finite() && alpha_in > 0.0 {
        alpha_in
    } else {
        1.0
    };
    let Some(mut alpha) = minimizer(start, eval(start)) else {
        return backtracking(objective, value, x, grad, direction);
    };
    let mut trial = eval(alpha);

    let mut refinements = 0;
    while !satisfies_armijo(trial, value, alpha, b) {
        refinements += 1;
        if refinements > MAX_QUADRATIC_REFINEMENTS {
            warn!("quadratic approximation failed more than {MAX_QUADRATIC_REFINEMENTS} times, starting backtracking line search");
            return backtracking(objective, value, x, grad, direction);
        }
        match minimizer(alpha, trial) {
            Some(next) => alpha = next,
            None => return backtracking(objective, value, x, grad, direction),
        }
        trial = eval(alpha);
    }
    Ok(alpha)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::optimize::tests::{Bowl, Rosenbrock};
    use approx::assert_abs_diff_eq;

    #[test]
    fn backtracking_accepts_full_newton_step() {
        let x = VectorN::zeros(2);
        let grad = Bowl.gradient(&x);
        let direction = VectorN::from_vec(vec![1.0, -2.0]);
        let alpha = backtracking(&Bowl, Bowl.value(&x), &x, &grad, &direction).unwrap();
        assert_abs_diff_eq!(alpha, 1.0);
    }

    #[test]
    fn backtracking_halves_long_steps() {
        let x = VectorN::zeros(2);
        let grad = Bowl.gradient(&x);
        let direction = -&grad;
        let alpha = backtracking(&Bowl, Bowl.value(&x), &x, &grad, &direction).unwrap();
        assert!(alpha < 1.0);
        let next = &x + &direction * alpha;
        assert!(Bowl.value(&next) < Bowl.value(&x));
    }

    #[test]
    fn backtracking_fails_on_ascent_direction() {
        let x = VectorN::zeros(2);
        let grad = Bowl.gradient(&x);
        let result = backtracking(&Bowl, Bowl.value(&x), &x, &grad, &grad);
        assert!(result.is_err());
    }

    #[test]
    fn quadratic_is_exact_on_quadratics() {
        let x = VectorN::zeros(2);
        let grad = Bowl.gradient(&x);
        let direction = -&grad;
        let alpha =
            quadratic_approximation(&Bowl, Bowl.value(&x), &x, &grad, &direction, 1.0).unwrap();
        // exact minimizer along -g is g.g / (g^T H g)
        let curvature = 2.0 * grad[0].powi(2) + 20.0 * grad[1].powi(2);
        assert_abs_diff_eq!(alpha, grad.dot(&grad) / curvature, epsilon = 1e-10);
    }

    #[test]
    fn quadratic_decreases_rosenbrock() {
        let x = VectorN::from_vec(vec![-1.2, 1.0]);
        let grad = Rosenbrock.gradient(&x);
        let direction = -&grad;
        let value = Rosenbrock.value(&x);
        let alpha =
            quadratic_approximation(&Rosenbrock, value, &x, &grad, &direction, 1.0).unwrap();
        assert!(Rosenbrock.value(&(&x + &direction * alpha)) < value);
    }
}
