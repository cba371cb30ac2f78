//! Seeded synthetic MSOA datasets.
//!
//! Each region draws an IMD score and a population uniformly, gets true SEIR
//! rates that move linearly with IMD, and reports daily new cases as
//! `Poisson(sigma * E(t))` along the solved trajectory. The result is written
//! in the same three-CSV layout `io::ingest` reads, plus `truth.csv`.

use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Poisson;

use crate::domain::{DataPaths, ParamName, SeirParams, SimulateConfig};
use crate::error::AppError;
use crate::fit::{output_times, simulate_trajectory};
use crate::math::ode::OdeOptions;

pub const TRUTH_FILE: &str = "truth.csv";

/// Rates are kept inside this range so every region stays fittable.
const RATE_MIN: f64 = 1e-3;
const RATE_MAX: f64 = 10.0;

const EXPOSED: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRegion {
    pub code: String,
    pub imd: f64,
    pub population: u64,
    pub truth: SeirParams,
    pub new_cases: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticData {
    pub start_date: NaiveDate,
    pub regions: Vec<SyntheticRegion>,
}

fn validate(cfg: &SimulateConfig) -> Result<(), AppError> {
    if cfg.regions == 0 {
        return Err(AppError::input("Region count must be > 0."));
    }
    if cfg.days < 2 {
        return Err(AppError::input("Need at least 2 days."));
    }
    if !(cfg.imd_min.is_finite() && cfg.imd_max.is_finite() && cfg.imd_max > cfg.imd_min) {
        return Err(AppError::input("Invalid IMD range for synthetic data."));
    }
    if cfg.population_min == 0 || cfg.population_max < cfg.population_min {
        return Err(AppError::input("Invalid population range for synthetic data."));
    }
    if cfg.seed_compartments.total() > cfg.population_min as f64 {
        return Err(AppError::input("Seed compartments exceed the smallest population."));
    }
    if !(cfg.base.is_finite() && cfg.imd_slope.is_finite()) {
        return Err(AppError::input("Synthetic rates must be finite."));
    }
    Ok(())
}

/// True rates for a region with deprivation `imd`.
pub fn rates_for_imd(cfg: &SimulateConfig, imd: f64) -> SeirParams {
    let mid = 0.5 * (cfg.imd_min + cfg.imd_max);
    let mut out = cfg.base;
    for p in ParamName::ALL {
        let v = cfg.base.get(p) + cfg.imd_slope.get(p) * (imd - mid);
        out.set(p, v.clamp(RATE_MIN, RATE_MAX));
    }
    out
}

pub fn generate_dataset(cfg: &SimulateConfig) -> Result<SyntheticData, AppError> {
    validate(cfg)?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let times = output_times(cfg.days);
    let ode = OdeOptions::default();
    let mut regions = Vec::with_capacity(cfg.regions);

    for i in 0..cfg.regions {
        let imd = rng.gen_range(cfg.imd_min..=cfg.imd_max);
        let population = rng.gen_range(cfg.population_min..=cfg.population_max);
        let truth = rates_for_imd(cfg, imd);

        let ic = cfg.seed_compartments.for_population(population as f64);
        let trajectory = simulate_trajectory(&truth, &ic, &times, &ode)?;

        let mut new_cases = Vec::with_capacity(cfg.days);
        for state in &trajectory {
            let lambda = truth.sigma * state[EXPOSED];
            let count = if lambda > 0.0 && lambda.is_finite() {
                let poisson = Poisson::new(lambda)
                    .map_err(|e| AppError::numeric(format!("Case count distribution error: {e}")))?;
                let draw: f64 = poisson.sample(&mut rng);
                draw.min(u32::MAX as f64) as u32
            } else {
                0
            };
            new_cases.push(count);
        }

        regions.push(SyntheticRegion {
            code: format!("E02{:06}", i + 1),
            imd,
            population,
            truth,
            new_cases,
        });
    }

    tracing::debug!(regions = regions.len(), seed = cfg.seed, "generated synthetic dataset");

    Ok(SyntheticData {
        start_date: cfg.start_date,
        regions,
    })
}

/// `8123` -> `"8,123"`.
pub fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Write the three input CSVs plus `truth.csv` into `dir`.
pub fn write_dataset(data: &SyntheticData, dir: &Path) -> Result<DataPaths, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::input(format!("Failed to create output dir '{}': {e}", dir.display())))?;
    let paths = DataPaths::in_dir(dir);

    let mut imd = writer(&paths.imd)?;
    write_row(
        &mut imd,
        &[
            "MSOAC", "MSOAN", "LAD19C", "LAD19N", "Population", "IMD_rank", "IMD_decile", "IMD_score",
        ],
    )?;
    for r in &data.regions {
        let score = format!("{:.3}", r.imd);
        let population = r.population.to_string();
        write_row(&mut imd, &[&r.code, &r.code, "E09000001", "Synthetic", &population, "", "", &score])?;
    }
    finish(imd)?;

    let mut pop = writer(&paths.population)?;
    write_row(&mut pop, &["LA Code", "LA name", "MSOA Code", "MSOA Name", "All Ages"])?;
    for r in &data.regions {
        write_row(&mut pop, &["E09000001", "Synthetic", &r.code, &r.code, &with_thousands(r.population)])?;
    }
    finish(pop)?;

    let mut cases = writer(&paths.cases)?;
    write_row(
        &mut cases,
        &[
            "regionCode", "regionName", "areaCode", "areaName", "UtlaCode", "UtlaName", "LtlaCode", "LtlaName",
            "areaType", "date", "newCasesBySpecimenDate",
        ],
    )?;
    let days = data.regions.first().map_or(0, |r| r.new_cases.len());
    for day in 0..days {
        let date = (data.start_date + Duration::days(day as i64)).format("%Y-%m-%d").to_string();
        for r in &data.regions {
            let count = match r.new_cases.get(day) {
                Some(0) | None => "NA".to_string(),
                Some(c) => c.to_string(),
            };
            write_row(
                &mut cases,
                &[
                    "E12000007", "Synthetic", &r.code, &r.code, "", "", "", "", "msoa", &date, &count,
                ],
            )?;
        }
    }
    finish(cases)?;

    let mut truth = writer(&dir.join(TRUTH_FILE))?;
    write_row(&mut truth, &["code", "imd", "population", "beta", "sigma", "gamma"])?;
    for r in &data.regions {
        write_row(
            &mut truth,
            &[
                &r.code,
                &format!("{:.3}", r.imd),
                &r.population.to_string(),
                &format!("{:.8}", r.truth.beta),
                &format!("{:.8}", r.truth.sigma),
                &format!("{:.8}", r.truth.gamma),
            ],
        )?;
    }
    finish(truth)?;

    Ok(paths)
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create CSV '{}': {e}", path.display())))
}

fn write_row(w: &mut csv::Writer<fs::File>, fields: &[&str]) -> Result<(), AppError> {
    w.write_record(fields)
        .map_err(|e| AppError::input(format!("Failed to write CSV row: {e}")))
}

fn finish(mut w: csv::Writer<fs::File>) -> Result<(), AppError> {
    w.flush()
        .map_err(|e| AppError::input(format!("Failed to flush CSV: {e}")))
}
