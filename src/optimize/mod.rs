//! Unconstrained nonlinear minimization.
//!
//! Steepest descent, nonlinear conjugate gradients, quasi-Newton (BFGS, SR1)
//! and full Newton, each combined with a backtracking or
//! quadratic-approximation line search. All algorithms share the same
//! stopping rule: iterate while the iteration cap is not reached, the
//! relative change of the objective exceeds the tolerance, and the
//! gradient norm exceeds the tolerance.

mod conjugate_gradient;
pub mod line_search;
mod newton;
mod quasi_newton;

use crate::error::{OptimizationError, Result};
use crate::math::numeric_diff::numeric_hessian;
use crate::math::{MatrixN, VectorN};

/// Default iteration cap of the general optimizers.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default tolerance on relative objective change and gradient norm.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

/// Step used by the default finite-difference Hessian.
const HESSIAN_STEP: f64 = 1e-8;

/// A twice differentiable scalar function.
pub trait Objective {
    /// Evaluates the objective at `x`.
    fn value(&self, x: &VectorN) -> f64;

    /// Evaluates the gradient at `x`.
    fn gradient(&self, x: &VectorN) -> VectorN;

    /// Evaluates the Hessian at `x`.
    ///
    /// Defaults to forward differences of [`Objective::gradient`].
    fn hessian(&self, x: &VectorN) -> MatrixN {
        numeric_hessian(|y| self.gradient(y), x, HESSIAN_STEP)
    }
}

/// Beta update used by the nonlinear conjugate gradient method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgVariant {
    FletcherReeves,
    HestenesStiefel,
    PolakRibiere,
}

/// Minimization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Full Newton with the objective's Hessian.
    #[default]
    Newton,
    /// Quasi-Newton with the BFGS update.
    Bfgs,
    /// Quasi-Newton with the symmetric rank-one update.
    Sr1,
    /// Conjugate gradient with `beta = 0`.
    SteepestDescent,
    ConjugateGradient(CgVariant),
}

impl Algorithm {
    /// Line search used when the options do not request one explicitly.
    #[must_use]
    pub fn default_line_search(self) -> LineSearch {
        match self {
            Self::Newton | Self::Bfgs | Self::Sr1 => LineSearch::Backtracking,
            Self::SteepestDescent | Self::ConjugateGradient(_) => {
                LineSearch::QuadraticApproximation
            }
        }
    }
}

/// Step length strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearch {
    /// Armijo backtracking starting at a unit step.
    Backtracking,
    /// Minimum of a quadratic model, falling back to backtracking.
    QuadraticApproximation,
}

/// Stopping criteria and line search selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerOptions {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Tolerance on the relative objective change and the gradient norm.
    pub tolerance: f64,
    /// Line search override. `None` uses [`Algorithm::default_line_search`].
    pub line_search: Option<LineSearch>,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            line_search: None,
        }
    }
}

impl OptimizerOptions {
    /// Sets the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Forces a line search strategy.
    #[must_use]
    pub fn with_line_search(mut self, line_search: LineSearch) -> Self {
        self.line_search = Some(line_search);
        self
    }

    fn line_search_for(&self, algorithm: Algorithm) -> LineSearch {
        self.line_search
            .unwrap_or_else(|| algorithm.default_line_search())
    }

    fn should_continue(&self, iteration: usize, old_value: f64, value: f64, grad: &VectorN) -> bool {
        iteration < self.max_iterations
            && relative_change(old_value, value) > self.tolerance
            && grad.norm() > self.tolerance
    }
}

/// Snapshot handed to an observer after every iteration.
#[derive(Debug, Clone, Copy)]
pub struct Iteration<'a> {
    /// One-based iteration counter.
    pub iteration: usize,
    /// Current iterate.
    pub x: &'a VectorN,
    /// Objective value at `x`.
    pub value: f64,
    /// Step length chosen by the line search.
    pub step: f64,
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Best iterate.
    pub x: VectorN,
    /// Objective value at `x`.
    pub value: f64,
    /// Gradient norm at `x`.
    pub gradient_norm: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// `false` when the iteration cap stopped the run before the tolerance was met.
    pub converged: bool,
}

impl Minimum {
    fn new(
        x: VectorN,
        value: f64,
        old_value: f64,
        grad: &VectorN,
        iterations: usize,
        options: &OptimizerOptions,
    ) -> Self {
        let gradient_norm = grad.norm();
        let converged = relative_change(old_value, value) <= options.tolerance
            || gradient_norm <= options.tolerance;
        Self {
            x,
            value,
            gradient_norm,
            iterations,
            converged,
        }
    }
}

/// Minimizes `objective` starting from `x0`.
///
/// # Errors
///
/// Returns an error if the input is invalid or a line search breaks down.
pub fn minimize<O>(
    objective: &O,
    x0: VectorN,
    algorithm: Algorithm,
    options: &OptimizerOptions,
) -> Result<Minimum>
where
    O: Objective + ?Sized,
{
    minimize_observed(objective, x0, algorithm, options, &mut |_| {})
}

/// Like [`minimize`], calling `observer` once per iteration.
///
/// # Errors
///
/// Returns an error if the input is invalid or a line search breaks down.
pub fn minimize_observed<O>(
    objective: &O,
    x0: VectorN,
    algorithm: Algorithm,
    options: &OptimizerOptions,
    observer: &mut dyn FnMut(&Iteration<'_>),
) -> Result<Minimum>
where
    O: Objective + ?Sized,
{
    if x0.is_empty() {
        return Err(OptimizationError::InvalidInput("empty start vector".into()).into());
    }
    if x0.iter().any(|v| !v.is_finite()) {
        return Err(
            OptimizationError::InvalidInput("start vector is not finite".into()).into(),
        );
    }
    if options.tolerance.is_nan() || options.tolerance <= 0.0 {
        return Err(OptimizationError::InvalidInput(format!(
            "tolerance must be positive, got {}",
            options.tolerance
        ))
        .into());
    }

    let line_search = options.line_search_for(algorithm);
    match algorithm {
        Algorithm::Newton => newton::run(objective, x0, options, line_search, observer),
        Algorithm::Bfgs => quasi_newton::run(
            objective,
            x0,
            options,
            line_search,
            quasi_newton::Update::Bfgs,
            observer,
        ),
        Algorithm::Sr1 => quasi_newton::run(
            objective,
            x0,
            options,
            line_search,
            quasi_newton::Update::Sr1,
            observer,
        ),
        Algorithm::SteepestDescent => {
            conjugate_gradient::run(objective, x0, options, line_search, None, observer)
        }
        Algorithm::ConjugateGradient(variant) => {
            conjugate_gradient::run(objective, x0, options, line_search, Some(variant), observer)
        }
    }
}

fn relative_change(old_value: f64, value: f64) -> f64 {
    ((old_value - value) / value.max(1.0)).abs()
}

/// Why a Newton-type step went along the negative gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradientFallback {
    Singular,
    NotDescent,
}

impl std::fmt::Display for GradientFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Singular => write!(f, "singular hessian"),
            Self::NotDescent => write!(f, "hessian not positive definite"),
        }
    }
}

/// Solves `hess * d = -grad`, falling back to `-grad` when the Hessian is
/// singular or does not yield a descent direction.
pub(crate) fn newton_direction(
    hess: &MatrixN,
    grad: &VectorN,
) -> (VectorN, Option<GradientFallback>) {
    let steepest = -grad;
    match hess.clone().lu().solve(&steepest) {
        Some(direction) if direction.iter().all(|v| v.is_finite()) => {
            if direction.dot(grad) >= 0.0 {
                (steepest, Some(GradientFallback::NotDescent))
            } else {
                (direction, None)
            }
        }
        _ => (steepest, Some(GradientFallback::Singular)),
    }
}

/// Runs the selected line search along `direction`.
pub(crate) fn step_length<O>(
    line_search: LineSearch,
    objective: &O,
    value: f64,
    x: &VectorN,
    grad: &VectorN,
    direction: &VectorN,
    previous: f64,
) -> Result<f64>
where
    O: Objective + ?Sized,
{
    match line_search {
        LineSearch::Backtracking => {
            line_search::backtracking(objective, value, x, grad, direction)
        }
        LineSearch::QuadraticApproximation => line_search::quadratic_approximation(
            objective, value, x, grad, direction, previous,
        ),
    }
}
