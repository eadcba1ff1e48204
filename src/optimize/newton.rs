use tracing::{debug, warn};

use super::{newton_direction, step_length, Iteration, LineSearch, Minimum, Objective, OptimizerOptions};
use crate::error::Result;
use crate::math::VectorN;

pub(super) fn run<O>(
    objective: &O,
    x0: VectorN,
    options: &OptimizerOptions,
    line_search: LineSearch,
    observer: &mut dyn FnMut(&Iteration<'_>),
) -> Result<Minimum>
where
    O: Objective + ?Sized,
{
    let mut x = x0;
    let mut value = objective.value(&x);
    let mut old_value = value * 2.0 + 1.0;
    let mut grad = objective.gradient(&x);
    let mut iteration = 0;

    while options.should_continue(iteration, old_value, value, &grad) {
        iteration += 1;

        let hess = objective.hessian(&x);
        let (direction, fallback) = newton_direction(&hess, &grad);
        if let Some(fallback) = fallback {
            warn!(iteration, "{fallback}, going along gradient");
        }
        let step = step_length(line_search, objective, value, &x, &grad, &direction, 1.0)?;

        x += &direction * step;
        old_value = value;
        value = objective.value(&x);
        grad = objective.gradient(&x);

        debug!(iteration, value, step, x = ?x.as_slice(), "newton");
        observer(&Iteration {
            iteration,
            x: &x,
            value,
            step,
        });
    }

    Ok(Minimum::new(x, value, old_value, &grad, iteration, options))
}
