use tracing::{debug, trace};

use super::{step_length, CgVariant, Iteration, LineSearch, Minimum, Objective, OptimizerOptions};
use crate::error::Result;
use crate::math::VectorN;

/// Conjugate gradient coefficient. Steepest descent uses `variant = None`.
fn beta(variant: Option<CgVariant>, grad: &VectorN, old_grad: &VectorN, direction: &VectorN) -> f64 {
    let beta = match variant {
        None => return 0.0,
        Some(CgVariant::FletcherReeves) => grad.dot(grad) / old_grad.dot(old_grad),
        Some(CgVariant::HestenesStiefel) => {
            let dg = grad - old_grad;
            grad.dot(&dg) / direction.dot(&dg)
        }
        Some(CgVariant::PolakRibiere) => grad.dot(&(grad - old_grad)) / old_grad.dot(old_grad),
    };
    if beta.is_finite() {
        beta
    } else {
        0.0
    }
}

pub(super) fn run<O>(
    objective: &O,
    x0: VectorN,
    options: &OptimizerOptions,
    line_search: LineSearch,
    variant: Option<CgVariant>,
    observer: &mut dyn FnMut(&Iteration<'_>),
) -> Result<Minimum>
where
    O: Objective + ?Sized,
{
    let mut x = x0;
    let mut value = objective.value(&x);
    let mut old_value = value * 2.0;
    let mut grad = objective.gradient(&x);
    let mut direction = -&grad;
    let mut step = 1.0;
    let mut iteration = 0;

    while options.should_continue(iteration, old_value, value, &grad) {
        iteration += 1;

        if direction.dot(&grad) >= 0.0 {
            trace!(iteration, "restarting along steepest descent");
            direction = -&grad;
        }

        step = step_length(line_search, objective, value, &x, &grad, &direction, step)?;
        x += &direction * step;

        old_value = value;
        value = objective.value(&x);
        let old_grad = std::mem::replace(&mut grad, objective.gradient(&x));

        let b = beta(variant, &grad, &old_grad, &direction);
        direction = &direction * b - &grad;

        debug!(iteration, value, step, x = ?x.as_slice(), "conjugate gradient");
        observer(&Iteration {
            iteration,
            x: &x,
            value,
            step,
        });
    }

    Ok(Minimum::new(x, value, old_value, &grad, iteration, options))
}
