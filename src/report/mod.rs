//! Reporting utilities: modeled curves, rankings, and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{ParamName, RegionFit, SeedCompartments};
use crate::error::AppError;
use crate::fit::{output_times, simulate_infected};
use crate::math::ode::OdeOptions;

/// Best/worst fitted regions by RMSE (top-N each side).
#[derive(Debug, Clone)]
pub struct Rankings {
    pub worst: Vec<RegionFit>,
    pub best: Vec<RegionFit>,
}

/// Distribution of one fitted parameter across regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamStats {
    pub param: ParamName,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Regions where this parameter finished on a bound.
    pub at_bound: usize,
}

/// Modeled `I(t)` for a fitted region over its observed window.
pub fn modeled_curve(fit: &RegionFit, seed: &SeedCompartments, ode: &OdeOptions) -> Result<Vec<f64>, AppError> {
    let ic = seed.for_population(fit.population as f64);
    let curve = simulate_infected(&fit.params, &ic, &output_times(fit.observed.len()), ode)?;
    if curve.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numeric("Non-finite model value while rebuilding a fitted curve."));
    }
    Ok(curve)
}

/// Rank regions by RMSE.
pub fn rank_by_rmse(fits: &[RegionFit], top_n: usize) -> Rankings {
    let mut sorted = fits.to_vec();
    sorted.sort_by(|a, b| b.quality.rmse.total_cmp(&a.quality.rmse));
    let worst = sorted.iter().take(top_n).cloned().collect();

    sorted.reverse();
    let best = sorted.iter().take(top_n).cloned().collect();

    Rankings { worst, best }
}

pub fn param_stats(fits: &[RegionFit], param: ParamName) -> Option<ParamStats> {
    let mut values: Vec<f64> = fits
        .iter()
        .map(|f| f.params.get(param))
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    };

    Some(ParamStats {
        param,
        n,
        mean: values.iter().sum::<f64>() / n as f64,
        median,
        min: values[0],
        max: values[n - 1],
        at_bound: fits.iter().filter(|f| f.at_bound.contains(&param)).count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, SeirParams, SeriesKind};

    fn fit(code: &str, beta: f64, rmse: f64) -> RegionFit {
        RegionFit {
            code: code.to_string(),
            imd: 1.0,
            population: 1000,
            series: SeriesKind::Active,
            observed: vec![1.0, 1.0, 1.0],
            params: SeirParams {
                beta,
                sigma: 0.2,
                gamma: 0.1,
            },
            stderr: None,
            at_bound: if beta >= 10.0 { vec![ParamName::Beta] } else { vec![] },
            quality: FitQuality {
                chisqr: rmse * rmse * 3.0,
                reduced_chisqr: None,
                rmse,
                nfev: 1,
                success: true,
                message: String::new(),
            },
        }
    }

    #[test]
    fn rank_by_rmse_basic() {
        let fits = vec![fit("A", 1.0, 2.0), fit("B", 1.0, 7.5), fit("C", 1.0, 0.5)];
        let rankings = rank_by_rmse(&fits, 1);
        assert_eq!(rankings.worst.len(), 1);
        assert_eq!(rankings.worst[0].code, "B");
        assert_eq!(rankings.best.len(), 1);
        assert_eq!(rankings.best[0].code, "C");
    }

    #[test]
    fn param_stats_median_and_bound_count() {
        let fits = vec![fit("A", 1.0, 1.0), fit("B", 10.0, 1.0), fit("C", 3.0, 1.0), fit("D", 2.0, 1.0)];
        let stats = param_stats(&fits, ParamName::Beta).unwrap();
        assert_eq!(stats.n, 4);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.mean, 4.0);
        assert_eq!(stats.at_bound, 1);
        assert!(param_stats(&[], ParamName::Beta).is_none());
    }

    #[test]
    fn modeled_curve_matches_observed_length() {
        let f = fit("A", 0.9, 1.0);
        let curve = modeled_curve(&f, &SeedCompartments::default(), &OdeOptions::default()).unwrap();
        assert_eq!(curve.len(), 3);
        assert_eq!(curve[0], 1.0);
    }
}
