//! Adaptive ODE integration (Dormand–Prince 5(4)).
//!
//! The fitter solves the same four-dimensional SEIR system hundreds of times
//! per region, always reporting the state at a short list of integer days.
//! The integrator therefore:
//!
//! - works on fixed-size `[f64; D]` states (no heap traffic per stage)
//! - clips steps so every requested output time is hit exactly (no dense
//!   output interpolation)
//! - reuses the last stage as the first stage of the next step (FSAL)
//!
//! Tolerances default to the values of the classic `lsoda` driver
//! (`rtol = atol = 1.49012e-8`).

use std::fmt;

/// Default relative and absolute tolerance.
pub const DEFAULT_TOL: f64 = 1.49012e-8;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (also the 7th stage row).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between 5th- and 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Integrator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdeOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Total accepted + rejected steps before giving up.
    pub max_steps: usize,
    /// Optional first trial step; estimated from the initial slope when `None`.
    pub first_step: Option<f64>,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_TOL,
            atol: DEFAULT_TOL,
            max_steps: 100_000,
            first_step: None,
        }
    }
}

/// Why an integration stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// Output times empty, non-finite, or not strictly increasing.
    InvalidTimes,
    /// The state or its derivative became NaN/inf.
    NonFinite { t: f64 },
    /// The step size collapsed below machine precision.
    StepSizeUnderflow { t: f64, h: f64 },
    /// The step budget ran out.
    TooManySteps { t: f64, steps: usize },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::InvalidTimes => write!(f, "output times must be finite and strictly increasing"),
            SolveError::NonFinite { t } => write!(f, "non-finite state at t={t}"),
            SolveError::StepSizeUnderflow { t, h } => write!(f, "step size underflow at t={t} (h={h:e})"),
            SolveError::TooManySteps { t, steps } => write!(f, "step budget exhausted at t={t} after {steps} steps"),
        }
    }
}

impl std::error::Error for SolveError {}

/// Integrate `y' = f(t, y)` from `t_eval[0]` and return the state at every `t_eval` point.
///
/// Row 0 of the output is `y0` itself.
pub fn solve<const D: usize, F>(
    f: F,
    y0: [f64; D],
    t_eval: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<[f64; D]>, SolveError>
where
    F: Fn(f64, &[f64; D]) -> [f64; D],
{
    validate_times(t_eval)?;
    let mut t = t_eval[0];
    if !all_finite(&y0) {
        return Err(SolveError::NonFinite { t });
    }

    let mut out = Vec::with_capacity(t_eval.len());
    out.push(y0);
    if t_eval.len() == 1 {
        return Ok(out);
    }

    let mut y = y0;
    let mut k1 = f(t, &y);
    if !all_finite(&k1) {
        return Err(SolveError::NonFinite { t });
    }

    let span = t_eval[t_eval.len() - 1] - t;
    let mut h = opts
        .first_step
        .filter(|h| h.is_finite() && *h > 0.0)
        .unwrap_or_else(|| initial_step(&y, &k1, opts))
        .min(span);
    let mut steps = 0usize;

    for &target in &t_eval[1..] {
        while t < target {
            if steps >= opts.max_steps {
                return Err(SolveError::TooManySteps { t, steps });
            }
            steps += 1;

            let remaining = target - t;
            let lands = h >= remaining;
            let h_try = if lands { remaining } else { h };

            let (y_new, k7, err) = dopri_step(&f, t, &y, &k1, h_try);
            let err_norm = error_norm(&y, &y_new, &err, opts);

            if !(err_norm.is_finite() && all_finite(&y_new)) {
                h = h_try * MIN_FACTOR;
                check_step(t, h)?;
                continue;
            }

            if err_norm <= 1.0 {
                t = if lands { target } else { t + h_try };
                y = y_new;
                if !all_finite(&k7) {
                    return Err(SolveError::NonFinite { t });
                }
                k1 = k7;

                let factor = if err_norm == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                // A step clipped to land on `target` says nothing about the
                // step the dynamics would allow, so it never shrinks `h`.
                h = if lands { h.max(h_try * factor) } else { h_try * factor };
            } else {
                let factor = (SAFETY * err_norm.powf(-0.2)).max(MIN_FACTOR);
                h = h_try * factor;
                check_step(t, h)?;
            }
        }
        out.push(y);
    }

    Ok(out)
}

fn validate_times(t_eval: &[f64]) -> Result<(), SolveError> {
    if t_eval.is_empty() || t_eval.iter().any(|t| !t.is_finite()) {
        return Err(SolveError::InvalidTimes);
    }
    if t_eval.windows(2).any(|w| w[1] <= w[0]) {
        return Err(SolveError::InvalidTimes);
    }
    Ok(())
}

fn check_step(t: f64, h: f64) -> Result<(), SolveError> {
    let min_step = 10.0 * f64::EPSILON * t.abs().max(1.0);
    if !(h.is_finite() && h >= min_step) {
        return Err(SolveError::StepSizeUnderflow { t, h });
    }
    Ok(())
}

fn dopri_step<const D: usize, F>(
    f: &F,
    t: f64,
    y: &[f64; D],
    k1: &[f64; D],
    h: f64,
) -> ([f64; D], [f64; D], [f64; D])
where
    F: Fn(f64, &[f64; D]) -> [f64; D],
{
    let k2 = f(t + C2 * h, &combine(y, h, &[(A21, k1)]));
    let k3 = f(t + C3 * h, &combine(y, h, &[(A31, k1), (A32, &k2)]));
    let k4 = f(t + C4 * h, &combine(y, h, &[(A41, k1), (A42, &k2), (A43, &k3)]));
    let k5 = f(
        t + C5 * h,
        &combine(y, h, &[(A51, k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
    );
    let k6 = f(
        t + h,
        &combine(y, h, &[(A61, k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)]),
    );
    let y_new = combine(y, h, &[(B1, k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)]);
    let k7 = f(t + h, &y_new);

    let mut err = [0.0; D];
    for i in 0..D {
        err[i] = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
    }

    (y_new, k7, err)
}

/// `y + h * Σ a_j k_j`.
fn combine<const D: usize>(y: &[f64; D], h: f64, terms: &[(f64, &[f64; D])]) -> [f64; D] {
    let mut out = *y;
    for (a, k) in terms {
        for i in 0..D {
            out[i] += h * a * k[i];
        }
    }
    out
}

fn error_norm<const D: usize>(y: &[f64; D], y_new: &[f64; D], err: &[f64; D], opts: &OdeOptions) -> f64 {
    if D == 0 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..D {
        let scale = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
        let e = err[i] / scale;
        acc += e * e;
    }
    (acc / D as f64).sqrt()
}

fn initial_step<const D: usize>(y: &[f64; D], f0: &[f64; D], opts: &OdeOptions) -> f64 {
    let mut d0 = 0.0;
    let mut d1 = 0.0;
    for i in 0..D {
        let scale = opts.atol + opts.rtol * y[i].abs();
        d0 += (y[i] / scale).powi(2);
        d1 += (f0[i] / scale).powi(2);
    }
    let d0 = (d0 / D.max(1) as f64).sqrt();
    let d1 = (d1 / D.max(1) as f64).sqrt();
    if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}
