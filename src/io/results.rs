//! Read/write results JSON files.
//!
//! A results file is the portable record of an `estimate` run: the run
//! settings plus every fitted region (observed series included) and every
//! failure. `analyze` and `tui` work from it without refitting.
//!
//! The schema is defined by `domain::ResultsFile`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::Utc;

use crate::domain::{RegionFailure, RegionFit, ResultsFile, SeriesKind};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::math::ode::OdeOptions;

pub const TOOL_NAME: &str = "seir";

/// Assemble a results file from one run.
pub fn build_results_file(
    days: usize,
    series: SeriesKind,
    opts: &FitOptions,
    fits: &[RegionFit],
    failures: &[RegionFailure],
) -> ResultsFile {
    ResultsFile {
        tool: TOOL_NAME.to_string(),
        generated_at: Utc::now(),
        days,
        series,
        initial: opts.initial,
        bounds: opts.bounds,
        seed: opts.seed,
        rtol: opts.ode.rtol,
        atol: opts.ode.atol,
        regions: fits.to_vec(),
        failures: failures.to_vec(),
    }
}

/// Integrator settings the run was fitted with.
pub fn ode_options(results: &ResultsFile) -> OdeOptions {
    OdeOptions {
        rtol: results.rtol,
        atol: results.atol,
        ..OdeOptions::default()
    }
}

/// Write a results JSON file.
pub fn write_results_json(path: &Path, results: &ResultsFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create results JSON '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, results)
        .map_err(|e| AppError::input(format!("Failed to write results JSON: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

/// Read a results JSON file.
pub fn read_results_json(path: &Path) -> Result<ResultsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open results JSON '{}': {e}", path.display())))?;
    let results: ResultsFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::input(format!("Invalid results JSON: {e}")))?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, ParamName, SeirParams};

    fn sample_fit() -> RegionFit {
        RegionFit {
            code: "E02000001".to_string(),
            imd: 17.3,
            population: 9000,
            series: SeriesKind::Active,
            observed: vec![1.0, 0.0, 2.0],
            params: SeirParams {
                beta: 1.2,
                sigma: 10.0,
                gamma: 0.4,
            },
            stderr: None,
            at_bound: vec![ParamName::Sigma],
            quality: FitQuality {
                chisqr: 2.5,
                reduced_chisqr: None,
                rmse: 0.9,
                nfev: 41,
                success: true,
                message: "ok".to_string(),
            },
        }
    }

    #[test]
    fn json_survives_a_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let failures = vec![RegionFailure {
            code: "E02000009".to_string(),
            message: "ODE solve failed".to_string(),
        }];
        let file = build_results_file(30, SeriesKind::Active, &FitOptions::default(), &[sample_fit()], &failures);

        write_results_json(&path, &file).unwrap();
        let back = read_results_json(&path).unwrap();

        assert_eq!(back.tool, "seir");
        assert_eq!(back.regions, vec![sample_fit()]);
        assert_eq!(back.failures, failures);
        assert_eq!(back.initial, SeirParams::INITIAL_GUESS);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"series\": \"active\""));
        assert!(raw.contains("\"sigma\""));
    }

    #[test]
    fn run_tolerances_are_kept_for_rebuilding_curves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let mut opts = FitOptions::default();
        opts.ode.rtol = 1e-6;
        opts.ode.atol = 1e-4;

        let file = build_results_file(30, SeriesKind::Active, &opts, &[sample_fit()], &[]);
        write_results_json(&path, &file).unwrap();
        let back = read_results_json(&path).unwrap();

        let ode = ode_options(&back);
        assert_eq!(ode.rtol, 1e-6);
        assert_eq!(ode.atol, 1e-4);
        assert_eq!(ode.max_steps, OdeOptions::default().max_steps);
    }

    #[test]
    fn files_without_tolerances_use_solver_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let file = build_results_file(30, SeriesKind::Active, &FitOptions::default(), &[], &[]);
        let mut value = serde_json::to_value(&file).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("rtol");
        obj.remove("atol");
        std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

        let back = read_results_json(&path).unwrap();
        assert_eq!(ode_options(&back), OdeOptions::default());
    }

    #[test]
    fn invalid_json_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_results_json(&path).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }
}
