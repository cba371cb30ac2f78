//! Shared pipeline logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflows:
//! - estimate: ingest -> select regions -> fit (parallel) -> rankings
//! - analyze: results JSON -> filter -> correlations
//! - simulate: synthetic regions -> input CSVs
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use crate::analysis::{AnalysisReport, analyze};
use crate::data::{SyntheticData, generate_dataset, write_dataset};
use crate::domain::{AnalysisConfig, DataPaths, EstimateConfig, ParamName, RegionRecord, ResultsFile, SimulateConfig};
use crate::error::AppError;
use crate::fit::{BatchOutput, FitOptions, fit_all};
use crate::io::{IngestedData, load_regions, read_results_json};
use crate::report::{Rankings, rank_by_rmse};

/// All computed outputs of a single `seir estimate` run.
#[derive(Debug, Clone)]
pub struct EstimateOutput {
    pub ingest: IngestedData,
    pub fit_options: FitOptions,
    pub batch: BatchOutput,
    pub rankings: Rankings,
}

/// All computed outputs of a single `seir analyze` run.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub results: ResultsFile,
    pub report: AnalysisReport,
}

/// Reject settings that cannot produce a meaningful fit before any work starts.
pub fn validate_estimate_config(config: &EstimateConfig) -> Result<(), AppError> {
    if config.days <= ParamName::ALL.len() {
        return Err(AppError::input(format!(
            "--days must exceed the number of fitted parameters ({}).",
            ParamName::ALL.len()
        )));
    }
    for p in ParamName::ALL {
        let b = config.bounds.get(p);
        if let (Some(lo), Some(hi)) = (b.min, b.max) {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(AppError::input(format!("Invalid bounds for {}.", p.display_name())));
            }
        }
        let v = config.initial.get(p);
        if !v.is_finite() {
            return Err(AppError::input(format!("Initial {} must be finite.", p.display_name())));
        }
        if !b.contains(v) {
            tracing::warn!("Initial {} = {v} lies outside its bounds; it will be clamped", p.display_name());
        }
    }
    let seed = &config.seed;
    if [seed.exposed, seed.infected, seed.recovered]
        .iter()
        .any(|v| !(v.is_finite() && *v >= 0.0))
    {
        return Err(AppError::input("Seed compartments must be finite and >= 0."));
    }
    if !(config.rtol > 0.0 && config.atol > 0.0) {
        return Err(AppError::input("ODE tolerances must be > 0."));
    }
    if config.limit == Some(0) {
        return Err(AppError::input("--limit must be > 0."));
    }
    if config.max_nfev == Some(0) {
        return Err(AppError::input("--max-nfev must be > 0."));
    }
    Ok(())
}

/// Apply `--region` / `--limit` to the ingested regions.
pub fn select_regions(regions: &[RegionRecord], config: &EstimateConfig) -> Result<Vec<RegionRecord>, AppError> {
    let mut selected: Vec<RegionRecord> = match &config.region {
        Some(code) => {
            let found: Vec<RegionRecord> = regions.iter().filter(|r| &r.code == code).cloned().collect();
            if found.is_empty() {
                return Err(AppError::data(format!(
                    "Region {code} not found among complete regions."
                )));
            }
            found
        }
        None => regions.to_vec(),
    };
    if let Some(limit) = config.limit {
        selected.truncate(limit);
    }
    Ok(selected)
}

/// Execute the estimation pipeline and return the computed outputs.
pub fn run_estimate(config: &EstimateConfig) -> Result<EstimateOutput, AppError> {
    validate_estimate_config(config)?;

    // 1) Ingest and assemble complete regions.
    let ingest = load_regions(&config.data, config.days)?;
    let regions = select_regions(&ingest.regions, config)?;
    if regions.is_empty() {
        return Err(AppError::data("No complete regions remain after ingest."));
    }

    // 2) Fit every region independently.
    let fit_options = FitOptions::from_config(config);
    tracing::info!(
        "Fitting {} regions to {} over {} days",
        regions.len(),
        config.series.display_name(),
        config.days
    );
    let batch = fit_all(&regions, config.series, &fit_options);
    if batch.fits.is_empty() {
        return Err(AppError::numeric(format!(
            "All {} regions failed to fit.",
            batch.failures.len()
        )));
    }
    tracing::info!(
        "Fitted {} regions ({} converged, {} failed)",
        batch.fits.len(),
        batch.converged(),
        batch.failures.len()
    );

    // 3) Rank by fit quality.
    let rankings = rank_by_rmse(&batch.fits, config.top_n);

    Ok(EstimateOutput {
        ingest,
        fit_options,
        batch,
        rankings,
    })
}

/// Load a results file and run the correlation study.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisOutput, AppError> {
    let results = read_results_json(&config.results_path)?;
    if results.regions.is_empty() {
        return Err(AppError::data("Results file contains no fitted regions."));
    }

    let report = analyze(&results.regions, &config.filter);
    if report.points.len() < 3 {
        tracing::warn!(
            "Only {} regions passed the filter; correlations need at least 3",
            report.points.len()
        );
    }

    Ok(AnalysisOutput { results, report })
}

/// Generate and write a synthetic dataset.
pub fn run_simulate(config: &SimulateConfig) -> Result<(SyntheticData, DataPaths), AppError> {
    let data = generate_dataset(config)?;
    let paths = write_dataset(&data, &config.out_dir)?;
    tracing::info!("Wrote {} synthetic regions to {}", data.regions.len(), config.out_dir.display());
    Ok((data, paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoundSet, RegionFilter, SeedCompartments, SeirParams, SeriesKind};
    use crate::io::write_results_json;
    use chrono::NaiveDate;
    use std::path::Path;

    fn estimate_config(dir: &Path) -> EstimateConfig {
        EstimateConfig {
            data: DataPaths::in_dir(dir),
            days: 30,
            series: SeriesKind::Active,
            initial: SeirParams::INITIAL_GUESS,
            bounds: BoundSet::default(),
            seed: SeedCompartments::default(),
            rtol: 1.49012e-8,
            atol: 1.49012e-8,
            max_nfev: None,
            limit: None,
            region: None,
            top_n: 3,
            plot: false,
            plot_width: 80,
            plot_height: 20,
            export_results: None,
            export_json: None,
            export_summary: None,
        }
    }

    fn simulate_config(dir: &Path, regions: usize) -> SimulateConfig {
        SimulateConfig {
            out_dir: dir.to_path_buf(),
            regions,
            days: 30,
            seed: 3,
            imd_min: 5.0,
            imd_max: 50.0,
            population_min: 6_000,
            population_max: 9_000,
            base: SeirParams {
                beta: 0.9,
                sigma: 0.3,
                gamma: 0.2,
            },
            imd_slope: SeirParams {
                beta: 0.005,
                sigma: 0.0,
                gamma: 0.0,
            },
            start_date: NaiveDate::from_ymd_opt(2020, 10, 1).unwrap(),
            seed_compartments: SeedCompartments::default(),
        }
    }

    #[test]
    fn simulate_estimate_analyze_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (data, _paths) = run_simulate(&simulate_config(dir.path(), 4)).unwrap();
        assert_eq!(data.regions.len(), 4);

        let config = estimate_config(dir.path());
        let run = run_estimate(&config).unwrap();
        assert_eq!(run.ingest.regions.len(), 4);
        assert_eq!(run.batch.fits.len() + run.batch.failures.len(), 4);
        assert!(run.rankings.worst.len() <= 3);

        let json = dir.path().join("fits.json");
        let file = crate::io::build_results_file(30, SeriesKind::Active, &run.fit_options, &run.batch.fits, &run.batch.failures);
        write_results_json(&json, &file).unwrap();

        let out = run_analysis(&AnalysisConfig {
            results_path: json,
            filter: RegionFilter::default(),
            plot: false,
            plot_width: 80,
            plot_height: 20,
        })
        .unwrap();
        assert_eq!(out.report.n_total, run.batch.fits.len());
        assert_eq!(out.report.correlations.len(), 3);
    }

    #[test]
    fn region_and_limit_selection() {
        let dir = tempfile::tempdir().unwrap();
        run_simulate(&simulate_config(dir.path(), 3)).unwrap();
        let ingest = load_regions(&DataPaths::in_dir(dir.path()), 30).unwrap();

        let mut config = estimate_config(dir.path());
        config.region = Some("E02000002".to_string());
        let picked = select_regions(&ingest.regions, &config).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].code, "E02000002");

        config.region = None;
        config.limit = Some(2);
        assert_eq!(select_regions(&ingest.regions, &config).unwrap().len(), 2);

        config.region = Some("E02999999".to_string());
        let err = select_regions(&ingest.regions, &config).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
    }

    #[test]
    fn invalid_settings_are_rejected_early() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = estimate_config(dir.path());
        config.days = 3;
        assert_eq!(run_estimate(&config).unwrap_err().exit_code(), crate::error::EXIT_INPUT);

        let mut config = estimate_config(dir.path());
        config.bounds.beta.min = Some(5.0);
        config.bounds.beta.max = Some(1.0);
        assert!(validate_estimate_config(&config).is_err());

        let mut config = estimate_config(dir.path());
        config.seed.infected = -1.0;
        assert!(validate_estimate_config(&config).is_err());
    }

    #[test]
    fn missing_results_file_is_input_error() {
        let err = run_analysis(&AnalysisConfig {
            results_path: "does/not/exist.json".into(),
            filter: RegionFilter::default(),
            plot: false,
            plot_width: 80,
            plot_height: 20,
        })
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }
}
