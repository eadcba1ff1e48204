//! Forward-difference derivatives.
//!
//! Used as the default Hessian of an [`Objective`](crate::optimize::Objective)
//! and to cross-check analytic derivatives in tests.
use super::{MatrixN, VectorN};

/// Forward-difference gradient of `f` at `x` with step `h`.
#[must_use]
pub fn numeric_gradient<F>(f: F, x: &VectorN, h: f64) -> VectorN
where
    F: Fn(&VectorN) -> f64,
{
    let f0 = f(x);
    let mut grad = VectorN::zeros(x.len());
    for i in 0..x.len() {
        let mut shifted = x.clone();
        shifted[i] += h;
        grad[i] = (f(&shifted) - f0) / h;
    }
    grad
}

/// Forward-difference Hessian built from the gradient function `grad`.
///
/// Row `i` holds the change of the gradient along coordinate `i`.
#[must_use]
pub fn numeric_hessian<G>(grad: G, x: &VectorN, h: f64) -> MatrixN
where
    G: Fn(&VectorN) -> VectorN,
{
    let g0 = grad(x);
    let n = x.len();
    let mut hess = MatrixN::zeros(n, n);
    for i in 0..n {
        let mut shifted = x.clone();
        shifted[i] += h;
        let row = (grad(&shifted) - &g0) / h;
        hess.set_row(i, &row.transpose());
    }
    hess
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn paraboloid(x: &VectorN) -> f64 {
        x[0] * x[0] + 3.0 * x[0] * x[1] + 2.0 * x[1] * x[1]
    }

    fn paraboloid_grad(x: &VectorN) -> VectorN {
        VectorN::from_vec(vec![2.0 * x[0] + 3.0 * x[1], 3.0 * x[0] + 4.0 * x[1]])
    }

    #[test]
    fn gradient_matches_analytic() {
        let x = VectorN::from_vec(vec![0.4, -1.2]);
        let g = numeric_gradient(paraboloid, &x, 1e-7);
        assert_abs_diff_eq!(g, paraboloid_grad(&x), epsilon = 1e-5);
    }

    #[test]
    fn hessian_of_quadratic_is_constant() {
        let x = VectorN::from_vec(vec![2.0, 5.0]);
        let h = numeric_hessian(paraboloid_grad, &x, 1e-6);
        let expected = MatrixN::from_row_slice(2, 2, &[2.0, 3.0, 3.0, 4.0]);
        assert_abs_diff_eq!(h, expected, epsilon = 1e-6);
    }
}
