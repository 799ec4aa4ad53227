//! Bound-aware finite-difference gradients.
//!
//! Probes never leave `[0, 1]`: a coordinate too close to a bound for a
//! central difference falls back to the one-sided difference pointing inward.

use crate::optimizer::{Evaluator, FiniteDifference};
use crate::SharpeOptResult;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Step for coordinate value `xi`, scaled to its magnitude.
pub fn step_size(xi: f64, scheme: FiniteDifference) -> f64 {
    let base = match scheme {
        FiniteDifference::Forward => f64::EPSILON.sqrt(),
        FiniteDifference::Central => f64::EPSILON.cbrt(),
    };
    base * xi.abs().max(1.0)
}

/// Estimate the gradient at `x`, where `fx` is the objective at `x`.
///
/// Components that cannot be estimated (every probe rejected) come back as NaN.
pub(crate) fn estimate_gradient(
    eval: &Evaluator<'_>,
    x: &[f64],
    fx: f64,
    scheme: FiniteDifference,
) -> SharpeOptResult<Vec<f64>> {
    #[cfg(feature = "parallel")]
    {
        (0..x.len())
            .into_par_iter()
            .map(|i| partial_derivative(eval, x, fx, i, scheme))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..x.len())
            .map(|i| partial_derivative(eval, x, fx, i, scheme))
            .collect()
    }
}

fn partial_derivative(
    eval: &Evaluator<'_>,
    x: &[f64],
    fx: f64,
    i: usize,
    scheme: FiniteDifference,
) -> SharpeOptResult<f64> {
    let h = step_size(x[i], scheme);
    let can_up = x[i] + h <= 1.0;
    let can_down = x[i] - h >= 0.0;

    let probe = |delta: f64| -> SharpeOptResult<f64> {
        let mut shifted = x.to_vec();
        shifted[i] += delta;
        eval.value(&shifted)
    };

    if scheme == FiniteDifference::Central && can_up && can_down {
        let up = probe(h)?;
        let down = probe(-h)?;
        return Ok(match (up.is_finite(), down.is_finite()) {
            (true, true) => (up - down) / (2.0 * h),
            (true, false) => (up - fx) / h,
            (false, true) => (fx - down) / h,
            (false, false) => f64::NAN,
        });
    }

    if can_up {
        let up = probe(h)?;
        if up.is_finite() {
            return Ok((up - fx) / h);
        }
    }
    if can_down {
        let down = probe(-h)?;
        if down.is_finite() {
            return Ok((fx - down) / h);
        }
    }
    Ok(f64::NAN)
}
