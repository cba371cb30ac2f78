//! Linear least squares solver.
//!
//! Two callers lean on this:
//!
//! - the Levenberg–Marquardt step, which solves the damped, augmented system
//!   `[J; sqrt(λ)·D] δ = [-r; 0]` once per trial step
//! - the IMD regression in `analysis`, `param = a + b·imd`
//!
//! Both are tall systems (more rows than columns), so we solve via SVD.
//! (Nalgebra's `QR::solve` is intended for square systems and will panic for
//! non-square matrices.) Parameter dimensions are tiny (2–3 columns).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() != y.len() || x.ncols() == 0 {
        return None;
    }
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Sum of squares of a slice.
pub fn sum_squares(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn least_squares_rejects_shape_mismatch() {
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(solve_least_squares(&x, &y).is_none());
    }

    #[test]
    fn sum_of_squares() {
        assert!((sum_squares(&[1.0, -2.0]) - 5.0).abs() < 1e-12);
    }
}
