//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ r_i(x)²` for a residual function `r: ℝⁿ → ℝᵐ` with `m ≥ n`.
//!
//! - The Jacobian is approximated by forward differences with step
//!   `h_j = sqrt(max(epsfcn, ε)) · |x_j|` (the bare factor when `x_j = 0`).
//! - Each trial step solves the damped system `[J; sqrt(λ)·D] δ = [-r; 0]`
//!   with the SVD solver in `math::ols`; `D` keeps the running maximum of the
//!   Jacobian column norms (Marquardt scaling).
//! - A step is accepted when it lowers the cost; `λ` then shrinks by 10,
//!   otherwise it grows by 10.
//!
//! The residual function returns `None` (or non-finite values) when it cannot
//! be evaluated, e.g. when the ODE solver fails for a proposed parameter set.
//! During a trial step that is simply a rejected step; at the starting point it
//! is an error.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::{solve_least_squares, sum_squares};

/// Default `ftol` / `xtol`, matching MINPACK's `lmdif` defaults.
pub const DEFAULT_TOL: f64 = 1.49012e-8;

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    /// Stop when actual and predicted relative cost reductions are both below this.
    pub ftol: f64,
    /// Stop when the scaled step is below `xtol` times the scaled parameter norm.
    pub xtol: f64,
    /// Stop when the largest gradient component is at or below this.
    pub gtol: f64,
    /// Residual evaluation budget; `None` means `2000 * (n + 1)`.
    pub max_nfev: Option<usize>,
    /// Relative error of the residual function (finite-difference step).
    pub epsfcn: f64,
    pub initial_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            ftol: DEFAULT_TOL,
            xtol: DEFAULT_TOL,
            gtol: 0.0,
            max_nfev: None,
            epsfcn: f64::EPSILON,
            initial_lambda: 1e-3,
        }
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStatus {
    PerfectFit,
    FtolReached,
    XtolReached,
    GtolReached,
    MaxEvaluations,
    NoFurtherReduction,
}

impl LmStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            LmStatus::PerfectFit | LmStatus::FtolReached | LmStatus::XtolReached | LmStatus::GtolReached
        )
    }

    pub fn message(self) -> &'static str {
        match self {
            LmStatus::PerfectFit => "Residuals are exactly zero.",
            LmStatus::FtolReached => {
                "Both actual and predicted relative reductions in the sum of squares are at most ftol."
            }
            LmStatus::XtolReached => "The relative error between two consecutive iterates is at most xtol.",
            LmStatus::GtolReached => "The gradient is orthogonal to the residuals to within gtol.",
            LmStatus::MaxEvaluations => "Number of function evaluations reached max_nfev.",
            LmStatus::NoFurtherReduction => "No further reduction in the sum of squares is possible.",
        }
    }
}

/// Result of a minimization.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub x: Vec<f64>,
    pub residuals: Vec<f64>,
    /// `Σ r_i²` at `x`.
    pub cost: f64,
    pub nfev: usize,
    pub iterations: usize,
    pub status: LmStatus,
}

/// Minimize the sum of squared residuals starting from `x0`.
pub fn minimize<F>(mut f: F, x0: &[f64], opts: &LmOptions) -> Result<LmOutcome, AppError>
where
    F: FnMut(&[f64]) -> Option<Vec<f64>>,
{
    let n = x0.len();
    if n == 0 {
        return Err(AppError::input("No parameters to optimize."));
    }
    let max_nfev = opts.max_nfev.unwrap_or(2000 * (n + 1)).max(1);

    let mut x = x0.to_vec();
    let mut r = f(&x)
        .filter(|r| !r.is_empty() && r.iter().all(|v| v.is_finite()))
        .ok_or_else(|| AppError::numeric("Residuals could not be evaluated at the starting point."))?;
    let m = r.len();
    if m < n {
        return Err(AppError::data(format!(
            "Underdetermined problem: {m} residuals for {n} parameters."
        )));
    }

    let mut nfev = 1usize;
    let mut cost = sum_squares(&r);
    let mut lambda = opts.initial_lambda.max(LAMBDA_MIN);
    let mut diag = vec![0.0_f64; n];
    let mut iterations = 0usize;

    let status = 'outer: loop {
        if cost == 0.0 {
            break LmStatus::PerfectFit;
        }
        // A Jacobian costs `n` evaluations; stop if it would overrun the budget.
        if nfev + n > max_nfev {
            break LmStatus::MaxEvaluations;
        }

        let jac = forward_jacobian(&mut f, &x, &r, opts.epsfcn, &mut nfev)
            .ok_or_else(|| AppError::numeric("Jacobian could not be evaluated."))?;
        iterations += 1;

        let rv = DVector::from_column_slice(&r);
        let gradient = jac.transpose() * &rv;
        if gradient.amax() <= opts.gtol {
            break LmStatus::GtolReached;
        }

        for (j, d) in diag.iter_mut().enumerate() {
            let col_norm = jac.column(j).norm();
            *d = d.max(col_norm);
            if *d == 0.0 {
                *d = 1.0;
            }
        }
        let x_norm = scaled_norm(&diag, &x);

        loop {
            let Some(step) = damped_step(&jac, &rv, &diag, lambda) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    break 'outer LmStatus::NoFurtherReduction;
                }
                continue;
            };
            let step_norm = scaled_norm(&diag, step.as_slice());

            if nfev >= max_nfev {
                break 'outer LmStatus::MaxEvaluations;
            }
            let x_new: Vec<f64> = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
            let r_new = evaluate(&mut f, &x_new, m);
            nfev += 1;

            let accepted = r_new.and_then(|r_new| {
                let cost_new = sum_squares(&r_new);
                (cost_new < cost).then_some((r_new, cost_new))
            });

            match accepted {
                Some((r_new, cost_new)) => {
                    let linear = &rv + &jac * &step;
                    let predicted = (cost - linear.norm_squared()).max(0.0) / cost;
                    let actual = (cost - cost_new) / cost;

                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);

                    if actual <= opts.ftol && predicted <= opts.ftol {
                        break 'outer LmStatus::FtolReached;
                    }
                    if step_norm <= opts.xtol * x_norm {
                        break 'outer LmStatus::XtolReached;
                    }
                    break;
                }
                None => {
                    if step_norm <= opts.xtol * x_norm {
                        break 'outer LmStatus::XtolReached;
                    }
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        break 'outer LmStatus::NoFurtherReduction;
                    }
                }
            }
        }
    };

    Ok(LmOutcome {
        x,
        residuals: r,
        cost,
        nfev,
        iterations,
        status,
    })
}

/// Forward-difference Jacobian of `f` at `x` (falls back to a backward
/// difference for a column whose forward point cannot be evaluated).
///
/// Uses `n` evaluations, plus one per backward fallback.
pub fn forward_jacobian<F>(
    f: &mut F,
    x: &[f64],
    r: &[f64],
    epsfcn: f64,
    nfev: &mut usize,
) -> Option<DMatrix<f64>>
where
    F: FnMut(&[f64]) -> Option<Vec<f64>>,
{
    let m = r.len();
    let n = x.len();
    let eps = epsfcn.max(f64::EPSILON).sqrt();
    let mut jac = DMatrix::<f64>::zeros(m, n);
    let mut xp = x.to_vec();

    for j in 0..n {
        let h = {
            let h = eps * x[j].abs();
            if h == 0.0 { eps } else { h }
        };

        xp[j] = x[j] + h;
        let forward = evaluate(f, &xp, m);
        *nfev += 1;

        match forward {
            Some(rp) => {
                for i in 0..m {
                    jac[(i, j)] = (rp[i] - r[i]) / h;
                }
            }
            None => {
                xp[j] = x[j] - h;
                let backward = evaluate(f, &xp, m);
                *nfev += 1;
                let rm = backward?;
                for i in 0..m {
                    jac[(i, j)] = (r[i] - rm[i]) / h;
                }
            }
        }
        xp[j] = x[j];
    }

    Some(jac)
}

fn evaluate<F>(f: &mut F, x: &[f64], m: usize) -> Option<Vec<f64>>
where
    F: FnMut(&[f64]) -> Option<Vec<f64>>,
{
    f(x).filter(|r| r.len() == m && r.iter().all(|v| v.is_finite()))
}

fn damped_step(jac: &DMatrix<f64>, r: &DVector<f64>, diag: &[f64], lambda: f64) -> Option<DVector<f64>> {
    let m = jac.nrows();
    let n = jac.ncols();
    let sqrt_lambda = lambda.sqrt();

    let mut a = DMatrix::<f64>::zeros(m + n, n);
    a.view_mut((0, 0), (m, n)).copy_from(jac);
    for j in 0..n {
        a[(m + j, j)] = sqrt_lambda * diag[j];
    }

    let mut b = DVector::<f64>::zeros(m + n);
    for i in 0..m {
        b[i] = -r[i];
    }

    solve_least_squares(&a, &b)
}

fn scaled_norm(diag: &[f64], v: &[f64]) -> f64 {
    diag.iter()
        .zip(v.iter())
        .map(|(d, x)| (d * x).powi(2))
        .sum::<f64>()
        .sqrt()
}
