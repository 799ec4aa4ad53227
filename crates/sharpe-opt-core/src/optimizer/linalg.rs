// ---------------------------------------------------------------------------
// Vector helpers
// ---------------------------------------------------------------------------

/// Dot product.
pub(crate) fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(v: &[f64]) -> f64 {
    vec_dot(v, v).sqrt()
}

/// Matrix-vector multiplication.
pub(crate) fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

pub(crate) fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

// ---------------------------------------------------------------------------
// Linear systems
// ---------------------------------------------------------------------------

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when a pivot falls below `1e-14` times the largest entry.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = a.len();
    if n == 0 {
        return Some(Vec::new());
    }

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |m, v| m.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if !(max_val > 1e-14 * scale) {
            return None;
        }
        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot_row = aug[col].clone();
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()).skip(col) {
                *cell -= factor * pv;
            }
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|j| aug[row][j] * x[j]).sum();
        x[row] = (aug[row][n] - tail) / aug[row][row];
    }
    Some(x)
}

// ---------------------------------------------------------------------------
// Simplex helpers
// ---------------------------------------------------------------------------

/// Euclidean projection onto `{ x : x_i >= 0, sum(x) = 1 }`.
pub(crate) fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (j, u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (j + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }
    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Norm of `x - P(x - g)`, zero exactly at a stationary point on the simplex.
pub(crate) fn projected_gradient_norm(x: &[f64], g: &[f64]) -> f64 {
    let moved: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - gi).collect();
    let projected = project_onto_simplex(&moved);
    let diff: Vec<f64> = x.iter().zip(projected.iter()).map(|(a, b)| a - b).collect();
    norm(&diff)
}

/// Clip to `[0, 1]` and rescale to sum to one, erasing rounding drift.
pub(crate) fn clean_weights(x: &[f64]) -> Vec<f64> {
    let clipped: Vec<f64> = x.iter().map(|v| v.clamp(0.0, 1.0)).collect();
    let total: f64 = clipped.iter().sum();
    if total > 0.0 {
        clipped.iter().map(|v| v / total).collect()
    } else {
        project_onto_simplex(x)
    }
}
