//! Fit every region in parallel.
//!
//! Regions are independent, so the batch is a rayon `par_iter` over the
//! ingested records. Output order matches input order regardless of thread
//! scheduling; a failed region is recorded and the batch carries on.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::domain::{RegionFailure, RegionFit, RegionRecord, SeriesKind};
use crate::fit::fitter::{FitOptions, fit_region};

const PROGRESS_EVERY: usize = 100;

/// Per-region results of a batch, both in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub fits: Vec<RegionFit>,
    pub failures: Vec<RegionFailure>,
}

impl BatchOutput {
    /// Fits whose optimizer reported convergence.
    pub fn converged(&self) -> usize {
        self.fits.iter().filter(|f| f.quality.success).count()
    }
}

pub fn fit_all(regions: &[RegionRecord], series: SeriesKind, opts: &FitOptions) -> BatchOutput {
    let total = regions.len();
    let done = AtomicUsize::new(0);

    let results: Vec<Result<RegionFit, RegionFailure>> = regions
        .par_iter()
        .map(|region| {
            let result = fit_region(region, series, opts).map_err(|err| RegionFailure {
                code: region.code.clone(),
                message: err.message().to_string(),
            });

            match &result {
                Ok(fit) => tracing::debug!(
                    region = %fit.code,
                    beta = fit.params.beta,
                    sigma = fit.params.sigma,
                    gamma = fit.params.gamma,
                    nfev = fit.quality.nfev,
                    "region fitted"
                ),
                Err(failure) => tracing::warn!(region = %failure.code, "fit failed: {}", failure.message),
            }

            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % PROGRESS_EVERY == 0 || n == total {
                tracing::info!("Fitted {n}/{total} regions");
            }
            result
        })
        .collect();

    let mut out = BatchOutput::default();
    for result in results {
        match result {
            Ok(fit) => out.fits.push(fit),
            Err(failure) => out.failures.push(failure),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::fitter::{output_times, simulate_infected};
    use crate::math::ode::OdeOptions;
    use crate::domain::{SeedCompartments, SeirParams};

    fn region(code: &str, population: u64, active: Vec<u32>) -> RegionRecord {
        let n = active.len();
        RegionRecord {
            code: code.to_string(),
            imd: 12.0,
            population,
            new_cases: vec![0; n],
            active_cases: active,
            recovered_cases: vec![0; n],
        }
    }

    #[test]
    fn keeps_input_order_and_collects_failures() {
        let truth = SeirParams {
            beta: 0.8,
            sigma: 0.25,
            gamma: 0.15,
        };
        let ic = SeedCompartments::default().for_population(20_000.0);
        let curve: Vec<u32> = simulate_infected(&truth, &ic, &output_times(30), &OdeOptions::default())
            .unwrap()
            .iter()
            .map(|v| v.round() as u32)
            .collect();

        let regions = vec![
            region("E02000003", 20_000, curve.clone()),
            region("E02000001", 0, curve.clone()),
            region("E02000002", 20_000, curve),
        ];

        let out = fit_all(&regions, SeriesKind::Active, &FitOptions::default());
        let codes: Vec<&str> = out.fits.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["E02000003", "E02000002"]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].code, "E02000001");
        // Identical inputs give identical fits.
        assert_eq!(out.fits[0].params, out.fits[1].params);
    }

    #[test]
    fn empty_batch_is_empty() {
        let out = fit_all(&[], SeriesKind::Active, &FitOptions::default());
        assert!(out.fits.is_empty());
        assert!(out.failures.is_empty());
        assert_eq!(out.converged(), 0);
    }
}
