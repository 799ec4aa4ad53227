//! Sequential quadratic programming over the weight simplex.
//!
//! Each iteration builds a quadratic model from a finite-difference gradient
//! and a damped-BFGS Hessian estimate, solves it on the simplex with an
//! active-set method, then backtracks along the step until the Armijo
//! condition holds. Every iterate is feasible, so the objective itself serves
//! as the merit function.

use tracing::{debug, info, warn};

use crate::error::SharpeOptError;
use crate::optimizer::gradient::estimate_gradient;
use crate::optimizer::linalg::{
    clean_weights, identity, mat_vec_multiply, norm, projected_gradient_norm, vec_dot,
};
use crate::optimizer::qp::solve_simplex_qp;
use crate::optimizer::{
    check_feasible, ConstrainedOptimizer, Evaluator, Objective, OptimizationResult,
    OptimizerSettings, Termination,
};
use crate::SharpeOptResult;

/// Powell damping threshold for the BFGS curvature condition.
const BFGS_DAMPING: f64 = 0.2;

#[derive(Debug, Clone, Default)]
pub struct SqpOptimizer {
    pub settings: OptimizerSettings,
}

impl SqpOptimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }
}

impl ConstrainedOptimizer for SqpOptimizer {
    fn name(&self) -> &str {
        "SQP (damped BFGS, active-set QP, backtracking line search)"
    }

    fn minimize(
        &self,
        objective: &dyn Objective,
        x0: &[f64],
    ) -> SharpeOptResult<OptimizationResult> {
        self.settings.validate()?;
        let n = objective.dimension();
        if n == 0 {
            return Err(SharpeOptError::OptimizationFailure(
                "objective has no coordinates".into(),
            ));
        }
        check_feasible(x0, n)?;

        let eval = Evaluator::new(objective);

        if n == 1 {
            let fx = eval.value(&[1.0])?;
            return Ok(OptimizationResult {
                weights: vec![1.0],
                objective_value: fx,
                converged: true,
                termination: Termination::SingleAsset,
                iterations: 0,
                evaluations: eval.count(),
                projected_gradient_norm: 0.0,
            });
        }

        let mut x = clean_weights(x0);
        let mut fx = eval.value(&x)?;
        if fx.is_nan() {
            return Err(SharpeOptError::OptimizationFailure(
                "objective is NaN at the start point".into(),
            ));
        }
        if fx.is_infinite() {
            match finite_start(&eval, n)? {
                Some((alt, f_alt)) => {
                    warn!(start = ?alt, objective = f_alt, "start point rejected; searching from an alternative");
                    x = alt;
                    fx = f_alt;
                }
                None => {
                    warn!("objective rejected the start point and every alternative; returning it unchanged");
                    return Ok(OptimizationResult {
                        weights: x,
                        objective_value: fx,
                        converged: false,
                        termination: Termination::DegenerateStart,
                        iterations: 0,
                        evaluations: eval.count(),
                        projected_gradient_norm: f64::NAN,
                    });
                }
            }
        }

        let mut g = estimate_gradient(&eval, &x, fx, self.settings.difference)?;
        if g.iter().any(|v| !v.is_finite()) {
            return Err(SharpeOptError::OptimizationFailure(
                "non-finite gradient at the start point".into(),
            ));
        }

        let mut hessian = identity(n);
        let mut pg_norm = projected_gradient_norm(&x, &g);
        let mut step_norm = 0.0;
        let mut termination = Termination::MaxIterations;
        let mut iterations = 0;

        while iterations < self.settings.max_iterations {
            if self.stationary(step_norm, pg_norm) {
                termination = Termination::Converged;
                break;
            }

            let mut direction = solve_simplex_qp(&hessian, &g, &x);
            let mut slope = vec_dot(&g, &direction);
            if !(slope < 0.0) || norm(&direction) <= self.settings.step_tolerance {
                // Stale curvature can point uphill or stall; with the identity
                // the direction is the projected gradient step itself.
                hessian = identity(n);
                direction = solve_simplex_qp(&hessian, &g, &x);
                slope = vec_dot(&g, &direction);
            }
            if norm(&direction) <= self.settings.step_tolerance {
                termination = if pg_norm <= self.settings.gradient_tolerance {
                    Termination::Converged
                } else {
                    Termination::NoProgress
                };
                break;
            }
            if !(slope < 0.0) {
                termination = Termination::LineSearchStalled;
                break;
            }

            let Some((x_new, f_new)) = self.line_search(&eval, &x, fx, &direction, slope)? else {
                // No move is a zero step: stationary if the gradient agrees.
                termination = if pg_norm <= self.settings.gradient_tolerance {
                    Termination::Converged
                } else {
                    Termination::LineSearchStalled
                };
                break;
            };
            iterations += 1;

            let step: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
            step_norm = norm(&step);
            let f_change = (fx - f_new).abs();

            let g_new = estimate_gradient(&eval, &x_new, f_new, self.settings.difference)?;
            x = x_new;
            fx = f_new;
            if g_new.iter().any(|v| !v.is_finite()) {
                termination = Termination::NumericalBreakdown;
                break;
            }

            let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
            damped_bfgs_update(&mut hessian, &step, &y);
            g = g_new;
            pg_norm = projected_gradient_norm(&x, &g);

            debug!(
                iteration = iterations,
                objective = fx,
                step_norm,
                projected_gradient = pg_norm,
                "sqp iteration"
            );

            if self.stationary(step_norm, pg_norm) {
                termination = Termination::Converged;
                break;
            }
            if step_norm <= self.settings.step_tolerance
                && f_change <= self.settings.function_tolerance * (1.0 + fx.abs())
            {
                termination = Termination::NoProgress;
                break;
            }
        }

        // Iterates are already cleaned trial points; `fx` belongs to exactly this vector.
        let weights = x;
        let converged = termination.is_converged();
        if converged {
            info!(iterations, objective = fx, "sqp converged");
        } else {
            warn!(
                iterations,
                objective = fx,
                ?termination,
                "sqp stopped before convergence; returning best point found"
            );
        }

        Ok(OptimizationResult {
            weights,
            objective_value: fx,
            converged,
            termination,
            iterations,
            evaluations: eval.count(),
            projected_gradient_norm: pg_norm,
        })
    }
}

impl SqpOptimizer {
    /// Both the last step and the projected gradient are within tolerance.
    fn stationary(&self, step_norm: f64, pg_norm: f64) -> bool {
        step_norm <= self.settings.step_tolerance && pg_norm <= self.settings.gradient_tolerance
    }

    /// Backtrack from the full step until sufficient decrease.
    ///
    /// Trial points are convex combinations of feasible points, cleaned of
    /// rounding drift before evaluation. Rejected (degenerate) trials shrink
    /// the step like any other failure.
    fn line_search(
        &self,
        eval: &Evaluator<'_>,
        x: &[f64],
        fx: f64,
        direction: &[f64],
        slope: f64,
    ) -> SharpeOptResult<Option<(Vec<f64>, f64)>> {
        let mut alpha = 1.0;
        for _ in 0..self.settings.max_line_search_steps {
            let trial: Vec<f64> = x
                .iter()
                .zip(direction.iter())
                .map(|(xi, di)| xi + alpha * di)
                .collect();
            let trial = clean_weights(&trial);
            let f_trial = eval.value(&trial)?;
            if f_trial.is_finite() && f_trial <= fx + self.settings.armijo * alpha * slope {
                return Ok(Some((trial, f_trial)));
            }
            alpha *= 0.5;
        }
        Ok(None)
    }
}

/// Lowest finite objective among the vertices and two skewed interior
/// points, for when the requested start is rejected.
fn finite_start(eval: &Evaluator<'_>, n: usize) -> SharpeOptResult<Option<(Vec<f64>, f64)>> {
    let mut candidates: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut vertex = vec![0.0; n];
            vertex[i] = 1.0;
            vertex
        })
        .collect();
    let total = (n * (n + 1) / 2) as f64;
    let ramp: Vec<f64> = (1..=n).map(|k| k as f64 / total).collect();
    let mut reversed = ramp.clone();
    reversed.reverse();
    candidates.push(ramp);
    candidates.push(reversed);

    let mut best: Option<(Vec<f64>, f64)> = None;
    for candidate in candidates {
        let f = eval.value(&candidate)?;
        if !f.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, f_best)| f < *f_best) {
            best = Some((candidate, f));
        }
    }
    Ok(best)
}

/// Powell-damped BFGS update; keeps `b` positive definite.
#[allow(clippy::needless_range_loop)]
fn damped_bfgs_update(b: &mut [Vec<f64>], s: &[f64], y: &[f64]) {
    let bs = mat_vec_multiply(b, s);
    let s_bs = vec_dot(s, &bs);
    if !(s_bs > 1e-16) {
        return;
    }
    let s_y = vec_dot(s, y);
    let theta = if s_y >= BFGS_DAMPING * s_bs {
        1.0
    } else {
        (1.0 - BFGS_DAMPING) * s_bs / (s_bs - s_y)
    };
    let r: Vec<f64> = y
        .iter()
        .zip(bs.iter())
        .map(|(yi, bsi)| theta * yi + (1.0 - theta) * bsi)
        .collect();
    let s_r = vec_dot(s, &r);
    if !(s_r > 0.0) || !s_r.is_finite() {
        return;
    }
    let n = s.len();
    for i in 0..n {
        for j in 0..n {
            b[i][j] += r[i] * r[j] / s_r - bs[i] * bs[j] / s_bs;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
