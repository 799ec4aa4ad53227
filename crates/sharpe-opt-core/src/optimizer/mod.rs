//! Minimization over the long-only, fully-invested weight simplex.
//!
//! The feasible region is `{ x : 0 <= x_i <= 1, sum(x) = 1 }`. Any solver that
//! honours [`ConstrainedOptimizer`] can stand in for the bundled SQP method.

pub mod gradient;
pub(crate) mod linalg;
pub(crate) mod qp;
pub mod sqp;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SharpeOptError;
use crate::SharpeOptResult;

pub use sqp::SqpOptimizer;

/// Largest distance from sum(x) = 1 accepted as feasible.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Objective capability
// ---------------------------------------------------------------------------

/// A scalar function to minimize.
///
/// Returning [`SharpeOptError::DegenerateSeries`] marks the point as rejected;
/// solvers treat it as `+inf` instead of failing.
pub trait Objective: Sync {
    fn dimension(&self) -> usize;
    fn evaluate(&self, x: &[f64]) -> SharpeOptResult<f64>;
}

/// Adapts a plain function into an [`Objective`].
pub struct ClosureObjective<F> {
    dimension: usize,
    f: F,
}

impl<F> ClosureObjective<F>
where
    F: Fn(&[f64]) -> SharpeOptResult<f64> + Sync,
{
    pub fn new(dimension: usize, f: F) -> Self {
        Self { dimension, f }
    }
}

impl<F> Objective for ClosureObjective<F>
where
    F: Fn(&[f64]) -> SharpeOptResult<f64> + Sync,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn evaluate(&self, x: &[f64]) -> SharpeOptResult<f64> {
        (self.f)(x)
    }
}

// ---------------------------------------------------------------------------
// Solver contract
// ---------------------------------------------------------------------------

/// Finite-difference scheme for gradient estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiniteDifference {
    Forward,
    #[default]
    Central,
}

/// Tuning knobs shared by simplex-constrained solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub max_iterations: usize,
    /// Convergence threshold on the Euclidean norm of the accepted step.
    pub step_tolerance: f64,
    /// Convergence threshold on the projected-gradient norm.
    pub gradient_tolerance: f64,
    /// Relative objective change below which a small step ends the run as stalled.
    pub function_tolerance: f64,
    pub difference: FiniteDifference,
    pub max_line_search_steps: usize,
    /// Sufficient-decrease constant for the backtracking line search.
    pub armijo: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            step_tolerance: 1e-6,
            gradient_tolerance: 1e-6,
            function_tolerance: 1e-9,
            difference: FiniteDifference::Central,
            max_line_search_steps: 30,
            armijo: 1e-4,
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> SharpeOptResult<()> {
        if self.max_iterations == 0 {
            return Err(SharpeOptError::InvalidInput {
                field: "max_iterations".into(),
                reason: "Must be at least 1".into(),
            });
        }
        for (field, value) in [
            ("step_tolerance", self.step_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
            ("function_tolerance", self.function_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SharpeOptError::InvalidInput {
                    field: field.into(),
                    reason: format!("Must be finite and non-negative, got {}", value),
                });
            }
        }
        if !(self.armijo > 0.0 && self.armijo < 0.5) {
            return Err(SharpeOptError::InvalidInput {
                field: "armijo".into(),
                reason: format!("Must lie in (0, 0.5), got {}", self.armijo),
            });
        }
        Ok(())
    }
}

/// Why a solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Step and projected-gradient tolerances both met.
    Converged,
    /// Only one asset: the single feasible point.
    SingleAsset,
    MaxIterations,
    /// No step along the search direction gave sufficient decrease.
    LineSearchStalled,
    /// Steps and objective changes became negligible before the projected
    /// gradient reached its tolerance.
    NoProgress,
    /// Objective rejected the start point and every fallback start.
    DegenerateStart,
    /// Gradient became non-finite after the start point.
    NumericalBreakdown,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged | Termination::SingleAsset)
    }
}

/// Outcome of a solver run. `weights` is always feasible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: Vec<f64>,
    /// Objective at `weights`; `+inf` if the point was rejected.
    pub objective_value: f64,
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub evaluations: usize,
    pub projected_gradient_norm: f64,
}

/// Minimizes an [`Objective`] over `0 <= x_i <= 1`, `sum(x) = 1`.
pub trait ConstrainedOptimizer {
    fn name(&self) -> &str;

    /// `x0` must already be feasible; infeasible starts fail with
    /// [`SharpeOptError::OptimizationFailure`].
    fn minimize(&self, objective: &dyn Objective, x0: &[f64])
        -> SharpeOptResult<OptimizationResult>;
}

/// Uniform allocation, the default starting point.
pub fn uniform_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Check that `x` is a feasible allocation of dimension `n`.
pub fn check_feasible(x: &[f64], n: usize) -> SharpeOptResult<()> {
    if x.len() != n {
        return Err(SharpeOptError::OptimizationFailure(format!(
            "start point has {} coordinates, objective expects {}",
            x.len(),
            n
        )));
    }
    if let Some((i, v)) = x
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0 || **v > 1.0)
    {
        return Err(SharpeOptError::OptimizationFailure(format!(
            "start point coordinate {} = {} is outside [0, 1]",
            i, v
        )));
    }
    let sum: f64 = x.iter().sum();
    if (sum - 1.0).abs() > FEASIBILITY_TOLERANCE {
        return Err(SharpeOptError::OptimizationFailure(format!(
            "start point sums to {}, expected 1",
            sum
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluation bookkeeping
// ---------------------------------------------------------------------------

/// Counts objective calls and maps degenerate points to `+inf`.
pub(crate) struct Evaluator<'a> {
    objective: &'a dyn Objective,
    count: AtomicUsize,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(objective: &'a dyn Objective) -> Self {
        Self {
            objective,
            count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn value(&self, x: &[f64]) -> SharpeOptResult<f64> {
        self.count.fetch_add(1, Ordering::Relaxed);
        match self.objective.evaluate(x) {
            Ok(v) => Ok(v),
            Err(e) if e.is_degenerate() => {
                tracing::trace!(point = ?x, "rejected degenerate evaluation: {}", e);
                Ok(f64::INFINITY)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}
