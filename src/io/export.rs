//! Export per-region results to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets, GIS tools, or
//! downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{RegionFit, RegionRecord, SeirParams};
use crate::error::AppError;

/// Write one row per fitted region.
pub fn write_results_csv(path: &Path, fits: &[RegionFit]) -> Result<(), AppError> {
    let mut file = create(path)?;

    writeln!(
        file,
        "code,imd,population,series,beta,sigma,gamma,r0,beta_stderr,sigma_stderr,gamma_stderr,chisqr,rmse,nfev,success,at_bound"
    )
    .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;

    for fit in fits {
        let se = |f: fn(&SeirParams) -> f64| {
            fit.stderr.as_ref().map(|s| format!("{:.10}", f(s))).unwrap_or_default()
        };
        let at_bound: Vec<&str> = fit.at_bound.iter().map(|p| p.display_name()).collect();
        writeln!(
            file,
            "{},{:.6},{},{},{:.10},{:.10},{:.10},{},{},{},{},{:.6},{:.6},{},{},{}",
            fit.code,
            fit.imd,
            fit.population,
            fit.series.display_name().replace(' ', "_"),
            fit.params.beta,
            fit.params.sigma,
            fit.params.gamma,
            fit.params.r0().map(|v| format!("{v:.6}")).unwrap_or_default(),
            se(|s| s.beta),
            se(|s| s.sigma),
            se(|s| s.gamma),
            fit.quality.chisqr,
            fit.quality.rmse,
            fit.quality.nfev,
            fit.quality.success,
            at_bound.join(";"),
        )
        .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }

    flush(file)
}

/// Write per-region aggregates (`code, imd, population, total_new_cases`).
pub fn write_summary_csv(path: &Path, regions: &[RegionRecord]) -> Result<(), AppError> {
    let mut file = create(path)?;

    writeln!(file, "code,imd,population,total_new_cases")
        .map_err(|e| AppError::input(format!("Failed to write summary CSV header: {e}")))?;

    for r in regions {
        writeln!(file, "{},{:.6},{},{}", r.code, r.imd, r.population, r.total_new_cases())
            .map_err(|e| AppError::input(format!("Failed to write summary CSV row: {e}")))?;
    }

    flush(file)
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))
}

fn flush(mut file: BufWriter<File>) -> Result<(), AppError> {
    file.flush()
        .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))
}
