//! Command-line parsing for the SEIR estimator.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modeling/math code. Flags are turned into `domain` configs in `app`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::SeriesKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "seir", version, about = "SEIR parameter estimation per MSOA + IMD correlation")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit beta/sigma/gamma for every region, print a summary, and optionally plot/export.
    Estimate(EstimateArgs),
    /// Correlate fitted parameters with IMD from a saved results JSON.
    Analyze(AnalyzeArgs),
    /// Write a seeded synthetic dataset in the input CSV layout.
    Simulate(SimulateArgs),
    /// Browse a saved results JSON interactively.
    Tui(TuiArgs),
}

/// Input file locations.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Directory holding the three input CSVs (default: $SEIR_DATA_DIR, then `datas`).
    #[arg(short = 'd', long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// IMD CSV (overrides the file in --data-dir).
    #[arg(long, value_name = "CSV")]
    pub imd: Option<PathBuf>,

    /// Population CSV (overrides the file in --data-dir).
    #[arg(long, value_name = "CSV")]
    pub population: Option<PathBuf>,

    /// Case CSV (overrides the file in --data-dir).
    #[arg(long, value_name = "CSV")]
    pub cases: Option<PathBuf>,

    /// Required length of each region's case series.
    #[arg(long, default_value_t = 30)]
    pub days: usize,
}

/// Options for `seir estimate`.
#[derive(Debug, Args, Clone)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Observed series the infected compartment is fitted to.
    #[arg(long, value_enum, default_value_t = SeriesKind::Active)]
    pub series: SeriesKind,

    /// Initial guess for beta.
    #[arg(long, default_value_t = 1.14)]
    pub beta0: f64,

    /// Initial guess for sigma.
    #[arg(long, default_value_t = 0.02)]
    pub sigma0: f64,

    /// Initial guess for gamma.
    #[arg(long, default_value_t = 0.02)]
    pub gamma0: f64,

    /// Lower bound for all three rates.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub lower: f64,

    /// Upper bound for all three rates.
    #[arg(long, default_value_t = 10.0)]
    pub upper: f64,

    /// Exposed people at t=0.
    #[arg(long, default_value_t = 0.0)]
    pub seed_exposed: f64,

    /// Infected people at t=0.
    #[arg(long, default_value_t = 1.0)]
    pub seed_infected: f64,

    /// Recovered people at t=0.
    #[arg(long, default_value_t = 0.0)]
    pub seed_recovered: f64,

    /// ODE relative tolerance.
    #[arg(long, default_value_t = 1.49012e-8)]
    pub rtol: f64,

    /// ODE absolute tolerance.
    #[arg(long, default_value_t = 1.49012e-8)]
    pub atol: f64,

    /// Optimizer evaluation budget per region (default 2000 * (3 + 1)).
    #[arg(long)]
    pub max_nfev: Option<usize>,

    /// Fit only the first N regions.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Fit only this area code.
    #[arg(long, value_name = "CODE")]
    pub region: Option<String>,

    /// Worker threads (default: one per core).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Show top-N worst and best fits.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Render an ASCII plot of the worst fit (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export per-region fits to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the full run (settings + fits + failures) to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    /// Export per-region case totals (code, imd, population, total_new_cases) to CSV.
    #[arg(long = "export-summary")]
    pub export_summary: Option<PathBuf>,
}

/// Which fitted regions enter the correlation study.
#[derive(Debug, Args, Clone, Default)]
pub struct FilterArgs {
    /// Drop regions whose optimizer did not converge.
    #[arg(long)]
    pub require_success: bool,

    /// Drop regions with any parameter on a bound.
    #[arg(long)]
    pub exclude_bound_hits: bool,

    #[arg(long)]
    pub min_beta: Option<f64>,
    #[arg(long)]
    pub max_beta: Option<f64>,
    #[arg(long)]
    pub min_sigma: Option<f64>,
    #[arg(long)]
    pub max_sigma: Option<f64>,
    #[arg(long)]
    pub min_gamma: Option<f64>,
    #[arg(long)]
    pub max_gamma: Option<f64>,
}

/// Options for `seir analyze`.
#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Results JSON produced by `seir estimate --export-json`.
    #[arg(long, value_name = "JSON")]
    pub results: PathBuf,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Render IMD scatter plots (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the scatter plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for `seir simulate`.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output directory.
    #[arg(short = 'o', long, default_value = "synthetic")]
    pub out: PathBuf,

    /// Number of regions.
    #[arg(short = 'n', long, default_value_t = 50)]
    pub regions: usize,

    #[arg(long, default_value_t = 30)]
    pub days: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 2.0)]
    pub imd_min: f64,

    #[arg(long, default_value_t = 60.0)]
    pub imd_max: f64,

    #[arg(long, default_value_t = 5_000)]
    pub population_min: u64,

    #[arg(long, default_value_t = 12_000)]
    pub population_max: u64,

    /// True beta at the middle of the IMD range.
    #[arg(long, default_value_t = 0.9)]
    pub beta: f64,

    /// True sigma at the middle of the IMD range.
    #[arg(long, default_value_t = 0.3)]
    pub sigma: f64,

    /// True gamma at the middle of the IMD range.
    #[arg(long, default_value_t = 0.2)]
    pub gamma: f64,

    /// Change in beta per IMD point.
    #[arg(long, default_value_t = 0.005, allow_negative_numbers = true)]
    pub beta_slope: f64,

    /// Change in sigma per IMD point.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub sigma_slope: f64,

    /// Change in gamma per IMD point.
    #[arg(long, default_value_t = -0.001, allow_negative_numbers = true)]
    pub gamma_slope: f64,

    /// First specimen date.
    #[arg(long, default_value = "2020-10-01")]
    pub start_date: NaiveDate,
}

/// Options for `seir tui`.
#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    /// Results JSON produced by `seir estimate --export-json`.
    #[arg(long, value_name = "JSON")]
    pub results: PathBuf,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_defaults() {
        let cli = Cli::try_parse_from(["seir", "estimate"]).unwrap();
        let Command::Estimate(args) = cli.command else {
            panic!("expected estimate");
        };
        assert_eq!(args.data.days, 30);
        assert_eq!(args.series, SeriesKind::Active);
        assert_eq!(args.beta0, 1.14);
        assert_eq!(args.upper, 10.0);
        assert!(args.plot && !args.no_plot);
        assert!(!cli.verbose);
    }

    #[test]
    fn analyze_filter_flags() {
        let cli = Cli::try_parse_from([
            "seir",
            "analyze",
            "--results",
            "fits.json",
            "--min-sigma",
            "9",
            "--require-success",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.filter.min_sigma, Some(9.0));
        assert!(args.filter.require_success);
        assert!(!args.filter.exclude_bound_hits);
    }

    #[test]
    fn simulate_parses_dates_and_negative_slopes() {
        let cli = Cli::try_parse_from([
            "seir",
            "simulate",
            "--start-date",
            "2020-11-05",
            "--gamma-slope",
            "-0.002",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.start_date, NaiveDate::from_ymd_opt(2020, 11, 5).unwrap());
        assert_eq!(args.gamma_slope, -0.002);
    }

    #[test]
    fn analyze_requires_results() {
        assert!(Cli::try_parse_from(["seir", "analyze"]).is_err());
    }
}
