//! Pearson / Spearman correlation and simple linear regression.
//!
//! Each statistic returns `None` when it is undefined: fewer than three
//! points, mismatched lengths, non-finite values, or zero variance.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;
use crate::math::special::student_t_two_sided_p;

const MIN_POINTS: usize = 3;

/// A correlation coefficient with its two-sided p-value (`n - 2` df).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub coefficient: f64,
    pub p_value: f64,
    pub n: usize,
}

/// `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub n: usize,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

fn usable(x: &[f64], y: &[f64]) -> bool {
    x.len() == y.len() && x.len() >= MIN_POINTS && x.iter().chain(y.iter()).all(|v| v.is_finite())
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

/// Sample Pearson correlation coefficient.
pub fn pearson_r(x: &[f64], y: &[f64]) -> Option<f64> {
    if !usable(x, y) {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Two-sided p-value of `H0: rho = 0` via `t = r sqrt((n-2)/(1-r²))`.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    let df = n as f64 - 2.0;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return 0.0;
    }
    student_t_two_sided_p(r * (df / denom).sqrt(), df)
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let r = pearson_r(x, y)?;
    Some(Correlation {
        coefficient: r,
        p_value: correlation_p_value(r, x.len()),
        n: x.len(),
    })
}

/// Spearman rank correlation (Pearson on average ranks).
pub fn spearman(x: &[f64], y: &[f64]) -> Option<Correlation> {
    if !usable(x, y) {
        return None;
    }
    let r = pearson_r(&ranks(x), &ranks(y))?;
    Some(Correlation {
        coefficient: r,
        p_value: correlation_p_value(r, x.len()),
        n: x.len(),
    })
}

/// 1-based ranks; tied values share the average of their ranks.
pub fn ranks(v: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..v.len()).collect();
    order.sort_by(|&a, &b| v[a].total_cmp(&v[b]));

    let mut out = vec![0.0; v.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && v[order[j + 1]] == v[order[i]] {
            j += 1;
        }
        // Positions i..=j share rank (i+1 + j+1) / 2.
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            out[k] = rank;
        }
        i = j + 1;
    }
    out
}

/// Ordinary least squares line with `R² = 1 - SS_res / SS_tot`.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if !usable(x, y) {
        return None;
    }
    let n = x.len();
    let my = mean(y);
    let ss_tot: f64 = y.iter().map(|v| (v - my).powi(2)).sum();
    if ss_tot <= 0.0 || x.iter().all(|&v| v == x[0]) {
        return None;
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let coef = solve_least_squares(&design, &DVector::from_column_slice(y))?;
    let (intercept, slope) = (coef[0], coef[1]);

    let ss_res: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(&a, &b)| (b - (intercept + slope * a)).powi(2))
        .sum();

    Some(LinearFit {
        intercept,
        slope,
        r_squared: 1.0 - ss_res / ss_tot,
        n,
    })
}
