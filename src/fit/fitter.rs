//! Per-region SEIR parameter estimation.
//!
//! For one region:
//! - seed `[S0, E0, I0, R0]` from the population and the seed compartments
//! - integrate the SEIR system at `t = 0, 1, ..., days - 1`
//! - compare the infected compartment to the observed series
//! - minimize the squared residuals over `(beta, sigma, gamma)` inside their bounds
//!
//! The optimizer runs in bound-transformed coordinates (`fit::bounds`). Standard
//! errors are computed afterwards in external coordinates from a fresh
//! finite-difference Jacobian at the solution.

use nalgebra::DMatrix;

use crate::domain::{
    BoundSet, DEFAULT_DAYS, EstimateConfig, FitQuality, InitialConditions, ParamBounds, ParamName, RegionFit, RegionRecord,
    SeedCompartments, SeirParams, SeriesKind,
};
use crate::error::AppError;
use crate::fit::bounds::{all_to_external, all_to_internal};
use crate::fit::levmar::{self, LmOptions, LmOutcome};
use crate::math::ode::{self, OdeOptions, SolveError};
use crate::models::{INFECTED, SeirState, derivatives, initial_state};

/// A parameter within this distance of a bound counts as a bound hit.
pub const BOUND_TOL: f64 = 1e-6;

/// Fitting options shared by every region in a run.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Required length of every region's series.
    pub days: usize,
    pub initial: SeirParams,
    pub bounds: BoundSet,
    pub seed: SeedCompartments,
    pub ode: OdeOptions,
    pub lm: LmOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            initial: SeirParams::INITIAL_GUESS,
            bounds: BoundSet::default(),
            seed: SeedCompartments::default(),
            ode: OdeOptions::default(),
            lm: LmOptions::default(),
        }
    }
}

impl FitOptions {
    pub fn from_config(cfg: &EstimateConfig) -> Self {
        Self {
            days: cfg.days,
            initial: cfg.initial,
            bounds: cfg.bounds,
            seed: cfg.seed,
            ode: OdeOptions {
                rtol: cfg.rtol,
                atol: cfg.atol,
                ..OdeOptions::default()
            },
            lm: LmOptions {
                max_nfev: cfg.max_nfev,
                ..LmOptions::default()
            },
        }
    }
}

/// Output grid `0, 1, ..., days - 1`.
pub fn output_times(days: usize) -> Vec<f64> {
    (0..days).map(|d| d as f64).collect()
}

/// Full `[S, E, I, R]` trajectory at `times`.
pub fn simulate_trajectory(
    params: &SeirParams,
    ic: &InitialConditions,
    times: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<SeirState>, SolveError> {
    ode::solve(|_, y| derivatives(y, params), initial_state(ic), times, opts)
}

/// Infected compartment `I(t)` at `times`.
pub fn simulate_infected(
    params: &SeirParams,
    ic: &InitialConditions,
    times: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<f64>, SolveError> {
    let rows = simulate_trajectory(params, ic, times, opts)?;
    Ok(rows.iter().map(|row| row[INFECTED]).collect())
}

/// `I(t_k) - observed_k` for every output time.
pub fn residuals(
    params: &SeirParams,
    ic: &InitialConditions,
    times: &[f64],
    observed: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<f64>, SolveError> {
    let model = simulate_infected(params, ic, times, opts)?;
    Ok(model.iter().zip(observed.iter()).map(|(m, o)| m - o).collect())
}

/// Fit one region's selected series.
pub fn fit_region(region: &RegionRecord, series: SeriesKind, opts: &FitOptions) -> Result<RegionFit, AppError> {
    if region.population == 0 {
        return Err(AppError::data(format!("Region {} has zero population.", region.code)));
    }
    let raw = region.series(series);
    if raw.len() != opts.days {
        return Err(AppError::data(format!(
            "Region {}: series has {} days, expected {}.",
            region.code,
            raw.len(),
            opts.days
        )));
    }
    let observed: Vec<f64> = raw.iter().map(|&c| f64::from(c)).collect();
    let (params, stderr, quality) = fit_series(&observed, region.population as f64, opts)
        .map_err(|e| AppError::new(e.exit_code(), format!("Region {}: {}", region.code, e.message())))?;

    let at_bound = bound_hits(&params, &opts.bounds);

    Ok(RegionFit {
        code: region.code.clone(),
        imd: region.imd,
        population: region.population,
        series,
        observed,
        params,
        stderr,
        at_bound,
        quality,
    })
}

/// Fit `(beta, sigma, gamma)` to an observed infected series.
pub fn fit_series(
    observed: &[f64],
    population: f64,
    opts: &FitOptions,
) -> Result<(SeirParams, Option<SeirParams>, FitQuality), AppError> {
    if observed.len() < 2 {
        return Err(AppError::data("Need at least two observations to fit."));
    }
    if observed.iter().any(|v| !v.is_finite()) {
        return Err(AppError::data("Observed series contains non-finite values."));
    }
    if !(population.is_finite() && population > 0.0) {
        return Err(AppError::data("Population must be positive."));
    }
    if opts.seed.total() > population {
        return Err(AppError::data(format!(
            "Seed compartments ({}) exceed population ({population}).",
            opts.seed.total()
        )));
    }

    let ic = opts.seed.for_population(population);
    let times = output_times(observed.len());
    let bounds = opts.bounds.to_array();
    let x0 = all_to_internal(&opts.initial.to_array(), &bounds);

    let outcome = levmar::minimize(
        |internal| {
            let params = params_from_internal(internal, &bounds);
            residuals(&params, &ic, &times, observed, &opts.ode).ok()
        },
        &x0,
        &opts.lm,
    )?;

    let params = params_from_internal(&outcome.x, &bounds);
    if !params.is_finite() {
        return Err(AppError::numeric("Optimizer returned non-finite parameters."));
    }

    let stderr = standard_errors(&params, &ic, &times, observed, &opts.ode, &outcome, opts.lm.epsfcn);
    let quality = fit_quality(&outcome, observed.len());

    Ok((params, stderr, quality))
}

fn params_from_internal(internal: &[f64], bounds: &[ParamBounds; 3]) -> SeirParams {
    let ext = all_to_external(internal, bounds);
    SeirParams::from_array([ext[0], ext[1], ext[2]])
}

fn fit_quality(outcome: &LmOutcome, n_obs: usize) -> FitQuality {
    let dof = n_obs.saturating_sub(ParamName::ALL.len());
    FitQuality {
        chisqr: outcome.cost,
        reduced_chisqr: (dof > 0).then(|| outcome.cost / dof as f64),
        rmse: (outcome.cost / n_obs as f64).sqrt(),
        nfev: outcome.nfev,
        success: outcome.status.is_success(),
        message: outcome.status.message().to_string(),
    }
}

/// Parameters that finished within `BOUND_TOL` of a bound.
pub fn bound_hits(params: &SeirParams, bounds: &BoundSet) -> Vec<ParamName> {
    ParamName::ALL
        .into_iter()
        .filter(|&p| bounds.get(p).is_at_bound(params.get(p), BOUND_TOL))
        .collect()
}

/// One-sigma errors from `cov = (JᵀJ)⁻¹ · chisqr / (n - 3)`.
///
/// Returns `None` when there are no spare degrees of freedom, the Jacobian
/// cannot be evaluated, or `JᵀJ` is singular.
fn standard_errors(
    params: &SeirParams,
    ic: &InitialConditions,
    times: &[f64],
    observed: &[f64],
    ode_opts: &OdeOptions,
    outcome: &LmOutcome,
    epsfcn: f64,
) -> Option<SeirParams> {
    let n_params = ParamName::ALL.len();
    let dof = observed.len().checked_sub(n_params).filter(|&d| d > 0)?;

    let x = params.to_array();
    let mut nfev = 0;
    let mut f = |p: &[f64]| {
        let p = SeirParams::from_array([p[0], p[1], p[2]]);
        residuals(&p, ic, times, observed, ode_opts).ok()
    };
    let jac: DMatrix<f64> = levmar::forward_jacobian(&mut f, &x, &outcome.residuals, epsfcn, &mut nfev)?;

    let jtj = jac.transpose() * &jac;
    let inv = jtj.try_inverse()?;
    let scale = outcome.cost / dof as f64;

    let mut se = [0.0; 3];
    for (j, slot) in se.iter_mut().enumerate() {
        let var = inv[(j, j)] * scale;
        if !(var.is_finite() && var >= 0.0) {
            return None;
        }
        *slot = var.sqrt();
    }
    Some(SeirParams::from_array(se))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth() -> SeirParams {
        SeirParams {
            beta: 0.9,
            sigma: 0.3,
            gamma: 0.2,
        }
    }

    fn exact_series(params: &SeirParams, population: f64, days: usize) -> Vec<f64> {
        let ic = SeedCompartments::default().for_population(population);
        simulate_infected(params, &ic, &output_times(days), &OdeOptions::default()).unwrap()
    }

    #[test]
    fn simulate_starts_from_seed() {
        let ic = SeedCompartments::default().for_population(1000.0);
        let infected = simulate_infected(&truth(), &ic, &output_times(5), &OdeOptions::default()).unwrap();
        assert_eq!(infected.len(), 5);
        assert_eq!(infected[0], 1.0);
        // Starting with E0 = 0 the infected compartment first dips while E fills.
        assert!(infected[1] < 1.0);
    }

    #[test]
    fn recovers_parameters_from_exact_curve() {
        let population = 100_000.0;
        let observed = exact_series(&truth(), population, 30);

        let opts = FitOptions {
            initial: SeirParams {
                beta: 1.08,
                sigma: 0.36,
                gamma: 0.24,
            },
            ..FitOptions::default()
        };
        let (params, _stderr, quality) = fit_series(&observed, population, &opts).unwrap();

        assert!(quality.success, "{}", quality.message);
        assert!((params.beta - 0.9).abs() < 1e-3, "beta={}", params.beta);
        assert!((params.sigma - 0.3).abs() < 1e-3, "sigma={}", params.sigma);
        assert!((params.gamma - 0.2).abs() < 1e-3, "gamma={}", params.gamma);
        assert!(quality.rmse < 1e-2);
    }

    #[test]
    fn standard_errors_match_central_difference_covariance() {
        let population = 50_000.0;
        let observed: Vec<f64> = exact_series(&truth(), population, 30)
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                v + sign * (2.0 + 0.03 * v)
            })
            .collect();
        let opts = FitOptions {
            initial: SeirParams {
                beta: 1.08,
                sigma: 0.36,
                gamma: 0.24,
            },
            ..FitOptions::default()
        };

        let (params, stderr, quality) = fit_series(&observed, population, &opts).unwrap();
        assert!(quality.success, "{}", quality.message);
        assert!(bound_hits(&params, &opts.bounds).is_empty());
        assert_eq!(quality.reduced_chisqr, Some(quality.chisqr / 27.0));
        let stderr = stderr.unwrap();

        // Reference: central differences around the solution.
        let ic = SeedCompartments::default().for_population(population);
        let times = output_times(30);
        let x = params.to_array();
        let mut jac = DMatrix::<f64>::zeros(30, 3);
        for j in 0..3 {
            let h = 1e-5 * x[j].abs();
            let (mut up, mut down) = (x, x);
            up[j] += h;
            down[j] -= h;
            let ode = OdeOptions::default();
            let r_up = residuals(&SeirParams::from_array(up), &ic, &times, &observed, &ode).unwrap();
            let r_down = residuals(&SeirParams::from_array(down), &ic, &times, &observed, &ode).unwrap();
            for i in 0..30 {
                jac[(i, j)] = (r_up[i] - r_down[i]) / (2.0 * h);
            }
        }
        let cov = (jac.transpose() * &jac).try_inverse().unwrap() * (quality.chisqr / 27.0);

        for (j, p) in ParamName::ALL.into_iter().enumerate() {
            let reference = cov[(j, j)].sqrt();
            let got = stderr.get(p);
            assert!(
                ((got - reference) / reference).abs() < 0.05,
                "{}: stderr {got} vs reference {reference}",
                p.display_name()
            );
        }
    }

    #[test]
    fn no_spare_degrees_of_freedom_means_no_standard_errors() {
        let (_, stderr, quality) = fit_series(&[1.0, 2.0, 3.0], 1000.0, &FitOptions::default()).unwrap();
        assert_eq!(stderr, None);
        assert_eq!(quality.reduced_chisqr, None);
        assert!(quality.chisqr.is_finite());

        let err = fit_series(&[1.0, 2.0], 1000.0, &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
    }

    #[test]
    fn series_length_must_match_configured_days() {
        let region = RegionRecord {
            code: "E02000004".to_string(),
            imd: 15.0,
            population: 8000,
            new_cases: vec![1; 5],
            active_cases: vec![1, 2, 3, 4, 5],
            recovered_cases: vec![0; 5],
        };

        let err = fit_region(&region, SeriesKind::Active, &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
        assert!(err.message().contains("E02000004"));
        assert!(err.message().contains("series has 5 days, expected 30"));

        let opts = FitOptions {
            days: 5,
            ..FitOptions::default()
        };
        let fit = fit_region(&region, SeriesKind::Active, &opts).unwrap();
        assert_eq!(fit.observed.len(), 5);
    }

    #[test]
    fn fit_region_stays_inside_bounds() {
        let observed = exact_series(&truth(), 8000.0, 30);
        let region = RegionRecord {
            code: "E02000001".to_string(),
            imd: 21.5,
            population: 8000,
            new_cases: vec![0; 30],
            active_cases: observed.iter().map(|v| v.round() as u32).collect(),
            recovered_cases: vec![0; 30],
        };

        let fit = fit_region(&region, SeriesKind::Active, &FitOptions::default()).unwrap();
        assert_eq!(fit.code, "E02000001");
        assert_eq!(fit.observed.len(), 30);
        assert!(fit.params.is_finite());
        for p in ParamName::ALL {
            assert!(ParamBounds::DEFAULT.contains(fit.params.get(p)));
        }
        assert!(fit.quality.chisqr.is_finite());
        assert!(fit.quality.reduced_chisqr.is_some());
    }

    #[test]
    fn zero_population_is_rejected() {
        let region = RegionRecord {
            code: "E02000002".to_string(),
            imd: 10.0,
            population: 0,
            new_cases: vec![1; 30],
            active_cases: vec![1; 30],
            recovered_cases: vec![0; 30],
        };
        let err = fit_region(&region, SeriesKind::Active, &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
        assert!(err.message().contains("E02000002"));
    }

    #[test]
    fn seed_larger_than_population_is_rejected() {
        let opts = FitOptions {
            seed: SeedCompartments {
                exposed: 5.0,
                infected: 5.0,
                recovered: 0.0,
            },
            ..FitOptions::default()
        };
        let err = fit_series(&[1.0; 30], 4.0, &opts).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
    }

    #[test]
    fn bound_hits_use_tolerance() {
        let params = SeirParams {
            beta: 10.0 - 5e-7,
            sigma: 0.5,
            gamma: 1e-9,
        };
        let hits = bound_hits(&params, &BoundSet::default());
        assert_eq!(hits, vec![ParamName::Beta, ParamName::Gamma]);
    }
}
