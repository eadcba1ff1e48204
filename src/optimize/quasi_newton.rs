use tracing::{debug, trace};

use super::{newton_direction, step_length, Iteration, LineSearch, Minimum, Objective, OptimizerOptions};
use crate::error::Result;
use crate::math::{MatrixN, VectorN};

/// Denominators below this magnitude skip the Hessian update.
const UPDATE_GUARD: f64 = 1e-12;

/// Hessian approximation update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Update {
    Bfgs,
    Sr1,
}

impl Update {
    /// Applies the update for step `p` and gradient change `q` in place.
    fn apply(self, hess: &mut MatrixN, p: &VectorN, q: &VectorN) {
        let hp = &*hess * p;
        match self {
            Self::Bfgs => {
                let qp = q.dot(p);
                let php = p.dot(&hp);
                if qp.abs() < UPDATE_GUARD || php.abs() < UPDATE_GUARD {
                    trace!(qp, php, "skipping bfgs update");
                    return;
                }
                *hess += q * q.transpose() / qp - &hp * hp.transpose() / php;
            }
            Self::Sr1 => {
                let r = q - hp;
                let denom = r.dot(p);
                if denom.abs() < UPDATE_GUARD * r.norm().max(1.0) * p.norm().max(1.0) {
                    trace!(denom, "skipping sr1 update");
                    return;
                }
                *hess += &r * r.transpose() / denom;
            }
        }
    }
}

/// Quasi-Newton direction. An indefinite SR1 approximation is routine, so
/// the gradient fallback is only logged at debug level.
fn search_direction(hess: &MatrixN, grad: &VectorN, iteration: usize, update: Update) -> VectorN {
    let (direction, fallback) = newton_direction(hess, grad);
    if let Some(fallback) = fallback {
        debug!(iteration, ?update, "{fallback} approximation, going along gradient");
    }
    direction
}

pub(super) fn run<O>(
    objective: &O,
    x0: VectorN,
    options: &OptimizerOptions,
    line_search: LineSearch,
    update: Update,
    observer: &mut dyn FnMut(&Iteration<'_>),
) -> Result<Minimum>
where
    O: Objective + ?Sized,
{
    let n = x0.len();
    let mut x = x0;
    let mut value = objective.value(&x);
    let mut old_value = value * 2.0;
    let mut grad = objective.gradient(&x);
    let mut hess = MatrixN::identity(n, n);
    let mut direction = -&grad;
    let mut step = 1.0;
    let mut iteration = 0;

    while options.should_continue(iteration, old_value, value, &grad) {
        iteration += 1;

        step = step_length(line_search, objective, value, &x, &grad, &direction, step)?;
        let p = &direction * step;
        x += &p;

        old_value = value;
        value = objective.value(&x);
        let old_grad = std::mem::replace(&mut grad, objective.gradient(&x));
        let q = &grad - &old_grad;

        update.apply(&mut hess, &p, &q);
        direction = search_direction(&hess, &grad, iteration, update);

        debug!(iteration, value, step, x = ?x.as_slice(), ?update, "quasi-newton");
        observer(&Iteration {
            iteration,
            x: &x,
            value,
            step,
        });
    }

    Ok(Minimum::new(x, value, old_value, &grad, iteration, options))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Log sink shared with a scoped subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn bfgs_update_satisfies_secant_condition() {
        let mut hess = MatrixN::identity(2, 2);
        let p = VectorN::from_vec(vec![0.5, -0.25]);
        let q = VectorN::from_vec(vec![1.0, -5.0]);
        Update::Bfgs.apply(&mut hess, &p, &q);
        assert_abs_diff_eq!(&hess * &p, q, epsilon = 1e-12);
    }

    #[test]
    fn sr1_update_satisfies_secant_condition() {
        let mut hess = MatrixN::identity(2, 2);
        let p = VectorN::from_vec(vec![0.5, -0.25]);
        let q = VectorN::from_vec(vec![1.0, -5.0]);
        Update::Sr1.apply(&mut hess, &p, &q);
        assert_abs_diff_eq!(&hess * &p, q, epsilon = 1e-12);
    }

    #[test]
    fn indefinite_sr1_approximation_is_logged_at_debug() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();

        let saddle = MatrixN::from_diagonal(&VectorN::from_vec(vec![1.0, -1.0]));
        let grad = VectorN::from_vec(vec![0.0, 1.0]);
        let direction = tracing::subscriber::with_default(subscriber, || {
            search_direction(&saddle, &grad, 3, Update::Sr1)
        });

        assert_abs_diff_eq!(direction, -&grad);
        let log = captured.text();
        assert!(log.contains("DEBUG"), "{log}");
        assert!(log.contains("hessian not positive definite approximation"), "{log}");
        assert!(!log.contains("WARN"), "{log}");
    }

    #[test]
    fn vanishing_step_leaves_hessian_untouched() {
        let mut hess = MatrixN::identity(2, 2);
        let p = VectorN::zeros(2);
        let q = VectorN::from_vec(vec![1.0, 0.0]);
        Update::Bfgs.apply(&mut hess, &p, &q);
        assert_eq!(hess, MatrixN::identity(2, 2));
    }
}
