//! Quadratic subproblem on the simplex tangent space.
//!
//! minimize    g'd + 1/2 d'Bd
//! subject to  sum(d) = 0,  -x_i <= d_i <= 1 - x_i
//!
//! Solved with a primal active-set method. `B` must be positive definite.

use crate::optimizer::linalg::{mat_vec_multiply, norm, solve_linear_system};

const MULTIPLIER_TOLERANCE: f64 = 1e-10;
const NULL_STEP: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundState {
    Free,
    Lower,
    Upper,
}

/// Search direction from `x`. The sum-constraint multiplier is tracked
/// internally to decide which bound to release.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_simplex_qp(b: &[Vec<f64>], g: &[f64], x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let lower: Vec<f64> = x.iter().map(|xi| -xi).collect();
    let upper: Vec<f64> = x.iter().map(|xi| 1.0 - xi).collect();

    // Coordinates sitting at zero start on their lower bound; the sum
    // constraint guarantees at least one stays free.
    let mut state: Vec<BoundState> = x
        .iter()
        .map(|xi| {
            if *xi <= 0.0 {
                BoundState::Lower
            } else {
                BoundState::Free
            }
        })
        .collect();

    let mut d = vec![0.0; n];
    let max_iterations = 10 * n + 50;

    for _ in 0..max_iterations {
        let bd = mat_vec_multiply(b, &d);
        let r: Vec<f64> = (0..n).map(|i| g[i] + bd[i]).collect();
        let free: Vec<usize> = (0..n).filter(|&i| state[i] == BoundState::Free).collect();

        if free.is_empty() {
            // Every coordinate pinned: the multiplier must sit between the
            // lower-bound and upper-bound requirements.
            let lo = (0..n)
                .filter(|&i| state[i] == BoundState::Lower)
                .map(|i| (-r[i], i))
                .fold((f64::NEG_INFINITY, None), |acc, (v, i)| {
                    if v > acc.0 {
                        (v, Some(i))
                    } else {
                        acc
                    }
                });
            let hi = (0..n)
                .filter(|&i| state[i] == BoundState::Upper)
                .map(|i| (-r[i], i))
                .fold((f64::INFINITY, None), |acc, (v, i)| {
                    if v < acc.0 {
                        (v, Some(i))
                    } else {
                        acc
                    }
                });
            if lo.0 <= hi.0 + MULTIPLIER_TOLERANCE {
                return d;
            }
            match lo.1.or(hi.1) {
                Some(i) => state[i] = BoundState::Free,
                None => return d,
            }
            continue;
        }

        // Equality-constrained step over the free coordinates:
        // [B_FF 1; 1' 0] [p; lambda] = [-r_F; 0]
        let m = free.len();
        let mut kkt = vec![vec![0.0; m + 1]; m + 1];
        let mut rhs = vec![0.0; m + 1];
        for (a, &i) in free.iter().enumerate() {
            for (c, &j) in free.iter().enumerate() {
                kkt[a][c] = b[i][j];
            }
            kkt[a][m] = 1.0;
            kkt[m][a] = 1.0;
            rhs[a] = -r[i];
        }
        let Some(sol) = solve_linear_system(&kkt, &rhs) else {
            return d;
        };
        let multiplier = sol[m];

        let mut p = vec![0.0; n];
        for (a, &i) in free.iter().enumerate() {
            p[i] = sol[a];
        }

        if norm(&p) <= NULL_STEP {
            // Stationary on the current face: drop the worst bound, if any.
            let worst = (0..n)
                .filter_map(|i| match state[i] {
                    BoundState::Lower => Some((r[i] + multiplier, i)),
                    BoundState::Upper => Some((-(r[i] + multiplier), i)),
                    BoundState::Free => None,
                })
                .fold(None, |acc: Option<(f64, usize)>, cur| match acc {
                    Some(best) if best.0 <= cur.0 => Some(best),
                    _ => Some(cur),
                });
            match worst {
                Some((nu, i)) if nu < -MULTIPLIER_TOLERANCE => state[i] = BoundState::Free,
                _ => return d,
            }
            continue;
        }

        // Longest feasible fraction of p, recording the first blocking bound.
        let mut alpha = 1.0;
        let mut blocking: Option<(usize, BoundState)> = None;
        for &i in &free {
            let (limit, bound) = if p[i] < 0.0 {
                ((lower[i] - d[i]) / p[i], BoundState::Lower)
            } else if p[i] > 0.0 {
                ((upper[i] - d[i]) / p[i], BoundState::Upper)
            } else {
                continue;
            };
            let limit = limit.max(0.0);
            if limit < alpha {
                alpha = limit;
                blocking = Some((i, bound));
            }
        }

        for &i in &free {
            d[i] += alpha * p[i];
        }
        if let Some((i, bound)) = blocking {
            d[i] = if bound == BoundState::Lower {
                lower[i]
            } else {
                upper[i]
            };
            state[i] = bound;
        }
    }

    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::linalg::identity;

    fn sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn test_interior_step_matches_projection() {
        // With B = I the step is -(g - mean(g)) when bounds are slack
        let x = [0.4, 0.3, 0.3];
        let g = [0.02, -0.01, -0.01];
        let step = solve_simplex_qp(&identity(3), &g, &x);
        assert!((step[0] + 0.02).abs() < 1e-12);
        assert!((step[1] - 0.01).abs() < 1e-12);
        assert!(sum(&step).abs() < 1e-12);
    }

    #[test]
    fn test_step_stops_at_bounds() {
        let x = [0.5, 0.5];
        let g = [-10.0, 10.0];
        let step = solve_simplex_qp(&identity(2), &g, &x);
        assert!((step[0] - 0.5).abs() < 1e-12);
        assert!((step[1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_vertex_optimum_gives_zero_step() {
        let x = [1.0, 0.0, 0.0];
        let g = [-1.0, 0.5, 0.3];
        let step = solve_simplex_qp(&identity(3), &g, &x);
        assert!(step.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_releases_attractive_bound() {
        // Start on a vertex where moving weight to asset 1 is downhill
        let x = [1.0, 0.0];
        let g = [0.5, -0.5];
        let step = solve_simplex_qp(&identity(2), &g, &x);
        assert!((step[1] - 0.5).abs() < 1e-12);
        assert!((step[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_step_keeps_iterate_in_box() {
        let x = [0.1, 0.2, 0.7];
        let g = [3.0, -1.0, -2.0];
        let b = vec![
            vec![2.0, 0.5, 0.0],
            vec![0.5, 1.0, 0.2],
            vec![0.0, 0.2, 3.0],
        ];
        let step = solve_simplex_qp(&b, &g, &x);
        for (xi, di) in x.iter().zip(step.iter()) {
            let next = xi + di;
            assert!((-1e-12..=1.0 + 1e-12).contains(&next), "out of box: {}", next);
        }
        assert!(sum(&step).abs() < 1e-12);
    }
}
