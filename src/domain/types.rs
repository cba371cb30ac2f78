//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for correlation analysis or browsing in the TUI

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Length of the observed case window (days).
pub const DEFAULT_DAYS: usize = 30;

/// Which observed series the model's infected compartment is fitted to.
///
/// `Active` is the two-day rolling count (`new[k] + new[k-1]`) that stands in
/// for currently-infectious people. `New` fits raw daily new cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Active,
    New,
}

impl SeriesKind {
    pub fn display_name(self) -> &'static str {
        match self {
            SeriesKind::Active => "active cases",
            SeriesKind::New => "new cases",
        }
    }
}

/// The three fitted rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParamName {
    Beta,
    Sigma,
    Gamma,
}

impl ParamName {
    pub const ALL: [ParamName; 3] = [ParamName::Beta, ParamName::Sigma, ParamName::Gamma];

    pub fn display_name(self) -> &'static str {
        match self {
            ParamName::Beta => "beta",
            ParamName::Sigma => "sigma",
            ParamName::Gamma => "gamma",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ParamName::Beta => ParamName::Sigma,
            ParamName::Sigma => ParamName::Gamma,
            ParamName::Gamma => ParamName::Beta,
        }
    }
}

/// SEIR rates (per day).
///
/// - `beta`: transmission rate
/// - `sigma`: latency rate (mean incubation `1/sigma`)
/// - `gamma`: recovery rate (mean infectious period `1/gamma`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeirParams {
    pub beta: f64,
    pub sigma: f64,
    pub gamma: f64,
}

impl SeirParams {
    /// Starting point used for every region.
    pub const INITIAL_GUESS: SeirParams = SeirParams {
        beta: 1.14,
        sigma: 0.02,
        gamma: 0.02,
    };

    pub fn get(&self, name: ParamName) -> f64 {
        match name {
            ParamName::Beta => self.beta,
            ParamName::Sigma => self.sigma,
            ParamName::Gamma => self.gamma,
        }
    }

    pub fn set(&mut self, name: ParamName, value: f64) {
        match name {
            ParamName::Beta => self.beta = value,
            ParamName::Sigma => self.sigma = value,
            ParamName::Gamma => self.gamma = value,
        }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.beta, self.sigma, self.gamma]
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self {
            beta: v[0],
            sigma: v[1],
            gamma: v[2],
        }
    }

    /// Basic reproduction number `beta / gamma` (undefined for `gamma <= 0`).
    pub fn r0(&self) -> Option<f64> {
        if self.gamma > 0.0 && self.beta.is_finite() {
            Some(self.beta / self.gamma)
        } else {
            None
        }
    }

    pub fn is_finite(&self) -> bool {
        self.beta.is_finite() && self.sigma.is_finite() && self.gamma.is_finite()
    }
}

/// Box constraint for one parameter. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ParamBounds {
    pub const DEFAULT: ParamBounds = ParamBounds {
        min: Some(0.0),
        max: Some(10.0),
    };

    pub fn contains(&self, v: f64) -> bool {
        self.min.is_none_or(|m| v >= m) && self.max.is_none_or(|m| v <= m)
    }

    pub fn clamp(&self, v: f64) -> f64 {
        let v = self.min.map_or(v, |m| v.max(m));
        self.max.map_or(v, |m| v.min(m))
    }

    /// True when `v` sits within `tol` of either finite bound.
    pub fn is_at_bound(&self, v: f64, tol: f64) -> bool {
        self.min.is_some_and(|m| (v - m).abs() <= tol) || self.max.is_some_and(|m| (v - m).abs() <= tol)
    }
}

/// Bounds for all three rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundSet {
    pub beta: ParamBounds,
    pub sigma: ParamBounds,
    pub gamma: ParamBounds,
}

impl Default for BoundSet {
    fn default() -> Self {
        Self {
            beta: ParamBounds::DEFAULT,
            sigma: ParamBounds::DEFAULT,
            gamma: ParamBounds::DEFAULT,
        }
    }
}

impl BoundSet {
    pub fn get(&self, name: ParamName) -> ParamBounds {
        match name {
            ParamName::Beta => self.beta,
            ParamName::Sigma => self.sigma,
            ParamName::Gamma => self.gamma,
        }
    }

    pub fn to_array(self) -> [ParamBounds; 3] {
        [self.beta, self.sigma, self.gamma]
    }
}

/// Compartment sizes seeded at `t = 0`; susceptibles take the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedCompartments {
    pub exposed: f64,
    pub infected: f64,
    pub recovered: f64,
}

impl Default for SeedCompartments {
    fn default() -> Self {
        Self {
            exposed: 0.0,
            infected: 1.0,
            recovered: 0.0,
        }
    }
}

impl SeedCompartments {
    pub fn for_population(&self, population: f64) -> InitialConditions {
        InitialConditions {
            exposed: self.exposed,
            infected: self.infected,
            recovered: self.recovered,
            population,
        }
    }

    pub fn total(&self) -> f64 {
        self.exposed + self.infected + self.recovered
    }
}

/// Initial condition vector for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialConditions {
    pub exposed: f64,
    pub infected: f64,
    pub recovered: f64,
    pub population: f64,
}

impl InitialConditions {
    pub fn susceptible(&self) -> f64 {
        self.population - (self.exposed + self.infected + self.recovered)
    }
}

/// One small area after ingest.
///
/// All three series have the same length (the configured number of days).
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub code: String,
    /// Deprivation score (higher = more deprived).
    pub imd: f64,
    pub population: u64,
    /// Daily new cases, in file order.
    pub new_cases: Vec<u32>,
    /// `new[k] + new[k-1]` (two-day active window).
    pub active_cases: Vec<u32>,
    /// Running total of cases that left the active window.
    pub recovered_cases: Vec<u32>,
}

impl RegionRecord {
    pub fn series(&self, kind: SeriesKind) -> &[u32] {
        match kind {
            SeriesKind::Active => &self.active_cases,
            SeriesKind::New => &self.new_cases,
        }
    }

    pub fn total_new_cases(&self) -> u64 {
        self.new_cases.iter().map(|&c| u64::from(c)).sum()
    }
}

/// Fit diagnostics for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// Sum of squared residuals.
    pub chisqr: f64,
    /// `chisqr / (n - 3)`; absent when there are no spare degrees of freedom.
    pub reduced_chisqr: Option<f64>,
    pub rmse: f64,
    /// Residual function evaluations (ODE solves).
    pub nfev: usize,
    pub success: bool,
    pub message: String,
}

/// Fitted parameters for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFit {
    pub code: String,
    pub imd: f64,
    pub population: u64,
    pub series: SeriesKind,
    pub observed: Vec<f64>,
    pub params: SeirParams,
    /// One-sigma standard errors from the final Jacobian.
    pub stderr: Option<SeirParams>,
    /// Parameters that finished on (or within 1e-6 of) a bound.
    pub at_bound: Vec<ParamName>,
    pub quality: FitQuality,
}

/// A region the estimator could not fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFailure {
    pub code: String,
    pub message: String,
}

/// Locations of the three input CSVs.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub imd: PathBuf,
    pub population: PathBuf,
    pub cases: PathBuf,
}

impl DataPaths {
    pub const IMD_FILE: &'static str = "IMD2019_MSOA.csv";
    pub const POPULATION_FILE: &'static str = "N.csv";
    pub const CASES_FILE: &'static str = "newCasesBySpecimenDate_msoa_2020.csv";

    /// Default file names inside a data directory.
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            imd: dir.join(Self::IMD_FILE),
            population: dir.join(Self::POPULATION_FILE),
            cases: dir.join(Self::CASES_FILE),
        }
    }
}

/// A full `seir estimate` run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults and `.env`).
#[derive(Debug, Clone)]
pub struct EstimateConfig {
    pub data: DataPaths,
    pub days: usize,
    pub series: SeriesKind,

    pub initial: SeirParams,
    pub bounds: BoundSet,
    pub seed: SeedCompartments,

    pub rtol: f64,
    pub atol: f64,
    /// Optimizer evaluation budget; `None` means `2000 * (n_params + 1)`.
    pub max_nfev: Option<usize>,

    /// Fit only the first `limit` regions (after ingest).
    pub limit: Option<usize>,
    /// Fit only this area code.
    pub region: Option<String>,

    pub top_n: usize,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
    pub export_summary: Option<PathBuf>,
}

/// Inclusive range filter on one fitted parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub param: ParamName,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Which fitted regions enter the correlation study.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionFilter {
    pub require_success: bool,
    pub exclude_bound_hits: bool,
    pub ranges: Vec<ParamRange>,
}

/// Configuration for `seir analyze`.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub results_path: PathBuf,
    pub filter: RegionFilter,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

/// Configuration for `seir simulate`.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub out_dir: PathBuf,
    pub regions: usize,
    pub days: usize,
    pub seed: u64,
    pub imd_min: f64,
    pub imd_max: f64,
    pub population_min: u64,
    pub population_max: u64,
    /// True rates at the midpoint of the IMD range.
    pub base: SeirParams,
    /// Change in each rate per IMD point (relative to the midpoint).
    pub imd_slope: SeirParams,
    pub start_date: NaiveDate,
    pub seed_compartments: SeedCompartments,
}

/// A saved estimation run (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub days: usize,
    pub series: SeriesKind,
    pub initial: SeirParams,
    pub bounds: BoundSet,
    pub seed: SeedCompartments,
    /// ODE tolerances of the run; modeled curves are rebuilt with the same settings.
    #[serde(default = "default_ode_tol")]
    pub rtol: f64,
    #[serde(default = "default_ode_tol")]
    pub atol: f64,
    pub regions: Vec<RegionFit>,
    pub failures: Vec<RegionFailure>,
}

fn default_ode_tol() -> f64 {
    crate::math::ode::DEFAULT_TOL
}
