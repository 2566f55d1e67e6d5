//! Small dense linear solvers.
//!
//! The systems solved in this crate are at most a few hundred unknowns
//! (tabular state counts, tile table sizes) so plain `O(n^3)` factorisations are used.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

/// Error solving a linear system.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LinalgError {
    #[error("matrix is not positive definite (pivot {pivot} at row {row})")]
    NotPositiveDefinite { row: usize, pivot: f64 },
    #[error("matrix is singular (column {column})")]
    Singular { column: usize },
    #[error("dimension mismatch: matrix is {rows}x{cols}, vector has length {len}")]
    DimensionMismatch { rows: usize, cols: usize, len: usize },
}

/// Lower-triangular Cholesky factor `L` with `A = L L^T`.
///
/// A pivot is rejected when it is not larger than `rel_tol` times the largest diagonal entry
/// of `A`; this treats numerically rank-deficient matrices as not positive definite.
pub fn cholesky(a: ArrayView2<f64>, rel_tol: f64) -> Result<Array2<f64>, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinalgError::DimensionMismatch {
            rows: n,
            cols: a.ncols(),
            len: n,
        });
    }
    let max_diag = a.diag().iter().fold(0.0_f64, |m, &x| m.max(x.abs()));
    let threshold = rel_tol * max_diag;

    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut pivot = a[(j, j)];
        for k in 0..j {
            pivot -= l[(j, k)] * l[(j, k)];
        }
        if !(pivot > threshold) || !pivot.is_finite() {
            return Err(LinalgError::NotPositiveDefinite { row: j, pivot });
        }
        let diag = pivot.sqrt();
        l[(j, j)] = diag;
        for i in (j + 1)..n {
            let mut value = a[(i, j)];
            for k in 0..j {
                value -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = value / diag;
        }
    }
    Ok(l)
}

/// Solve `L L^T x = b` given the Cholesky factor `L`.
pub fn cholesky_solve(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // Forward substitution: L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut value = b[i];
        for k in 0..i {
            value -= l[(i, k)] * y[k];
        }
        y[i] = value / l[(i, i)];
    }
    // Back substitution: L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut value = y[i];
        for k in (i + 1)..n {
            value -= l[(k, i)] * x[k];
        }
        x[i] = value / l[(i, i)];
    }
    x
}

/// Solve the general square system `A x = b` by Gaussian elimination with partial pivoting.
pub fn solve(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(LinalgError::DimensionMismatch {
            rows: n,
            cols: a.ncols(),
            len: b.len(),
        });
    }
    let mut m = a.to_owned();
    let mut x = b.to_owned();

    for col in 0..n {
        let (pivot_row, pivot_abs) = (col..n)
            .map(|row| (row, m[(row, col)].abs()))
            .fold((col, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if !(pivot_abs > f64::EPSILON) {
            return Err(LinalgError::Singular { column: col });
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap((col, k), (pivot_row, k));
            }
            x.swap(col, pivot_row);
        }
        let pivot = m[(col, col)];
        for row in (col + 1)..n {
            let factor = m[(row, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[(row, k)] -= factor * m[(col, k)];
            }
            x[row] -= factor * x[col];
        }
    }

    for row in (0..n).rev() {
        let mut value = x[row];
        for k in (row + 1)..n {
            value -= m[(row, k)] * x[k];
        }
        x[row] = value / m[(row, row)];
    }
    Ok(x)
}
