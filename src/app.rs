//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - sets up logging
//! - turns flags into domain configs
//! - runs the estimate / analyze / simulate pipelines
//! - prints reports/plots and writes optional exports

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{AnalyzeArgs, Command, DataArgs, EstimateArgs, FilterArgs, SimulateArgs, TuiArgs};
use crate::domain::{
    AnalysisConfig, BoundSet, DataPaths, EstimateConfig, ParamBounds, ParamName, ParamRange, RegionFilter,
    SeedCompartments, SeirParams, SimulateConfig,
};
use crate::error::AppError;

pub mod pipeline;

/// Environment variable naming the default data directory.
pub const DATA_DIR_ENV: &str = "SEIR_DATA_DIR";
/// Fallback data directory when neither the flag nor the env var is set.
pub const DEFAULT_DATA_DIR: &str = "datas";

/// Entry point for the `seir` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    let quiet = matches!(cli.command, Command::Tui(_));
    crate::logging::init_logger(cli.verbose, quiet);

    match cli.command {
        Command::Estimate(args) => handle_estimate(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Tui(args) => handle_tui(args),
    }
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let env_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
    let config = estimate_config_from_args(&args, env_dir);

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| AppError::input(format!("Failed to configure {threads} worker threads: {e}")))?;
    }

    let run = pipeline::run_estimate(&config)?;

    println!(
        "{}",
        crate::report::format_estimate_summary(&run.ingest, &run.batch, &config)
    );
    println!("{}", crate::report::format_rankings(&run.rankings));

    if config.plot {
        if let Some(fit) = run.rankings.worst.first() {
            match crate::report::modeled_curve(fit, &run.fit_options.seed, &run.fit_options.ode) {
                Ok(curve) => {
                    println!("Region {} (observed o, modeled -):", fit.code);
                    println!(
                        "{}",
                        crate::plot::render_fit_plot(fit, &curve, config.plot_width, config.plot_height)
                    );
                }
                Err(e) => tracing::warn!("Skipping plot for {}: {e}", fit.code),
            }
        }
    }

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::write_results_csv(path, &run.batch.fits)?;
        tracing::info!("Wrote {}", path.display());
    }
    if let Some(path) = &config.export_json {
        let results = crate::io::build_results_file(
            config.days,
            config.series,
            &run.fit_options,
            &run.batch.fits,
            &run.batch.failures,
        );
        crate::io::write_results_json(path, &results)?;
        tracing::info!("Wrote {}", path.display());
    }
    if let Some(path) = &config.export_summary {
        crate::io::write_summary_csv(path, &run.ingest.regions)?;
        tracing::info!("Wrote {}", path.display());
    }

    Ok(())
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args)?;
    let out = pipeline::run_analysis(&config)?;

    println!("{}", crate::report::format_analysis(&out.report, &out.results));

    if config.plot {
        for c in &out.report.correlations {
            let (imd, values) = out.report.columns(c.param);
            if imd.is_empty() {
                continue;
            }
            println!(
                "{}",
                crate::plot::render_scatter_plot(
                    c.param,
                    &imd,
                    &values,
                    c.regression.as_ref(),
                    config.plot_width,
                    config.plot_height,
                )
            );
        }
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulate_config_from_args(&args);
    let (data, paths) = pipeline::run_simulate(&config)?;

    println!("Wrote {} synthetic regions ({} days):", data.regions.len(), config.days);
    println!("  {}", paths.imd.display());
    println!("  {}", paths.population.display());
    println!("  {}", paths.cases.display());
    println!("  {}", config.out_dir.join(crate::data::TRUTH_FILE).display());
    Ok(())
}

fn handle_tui(args: TuiArgs) -> Result<(), AppError> {
    let config = AnalysisConfig {
        results_path: args.results.clone(),
        filter: filter_from_args(&args.filter)?,
        plot: false,
        plot_width: 0,
        plot_height: 0,
    };
    crate::tui::run(&config)
}

/// Resolve the three input paths: explicit file flags win, then `--data-dir`,
/// then `$SEIR_DATA_DIR`, then `datas/`.
pub fn data_paths_from_args(args: &DataArgs, env_dir: Option<PathBuf>) -> DataPaths {
    let dir = args
        .data_dir
        .clone()
        .or(env_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let mut paths = DataPaths::in_dir(&dir);
    if let Some(p) = &args.imd {
        paths.imd = p.clone();
    }
    if let Some(p) = &args.population {
        paths.population = p.clone();
    }
    if let Some(p) = &args.cases {
        paths.cases = p.clone();
    }
    paths
}

pub fn estimate_config_from_args(args: &EstimateArgs, env_dir: Option<PathBuf>) -> EstimateConfig {
    let bounds = ParamBounds {
        min: Some(args.lower),
        max: Some(args.upper),
    };
    EstimateConfig {
        data: data_paths_from_args(&args.data, env_dir),
        days: args.data.days,
        series: args.series,
        initial: SeirParams {
            beta: args.beta0,
            sigma: args.sigma0,
            gamma: args.gamma0,
        },
        bounds: BoundSet {
            beta: bounds,
            sigma: bounds,
            gamma: bounds,
        },
        seed: SeedCompartments {
            exposed: args.seed_exposed,
            infected: args.seed_infected,
            recovered: args.seed_recovered,
        },
        rtol: args.rtol,
        atol: args.atol,
        max_nfev: args.max_nfev,
        limit: args.limit,
        region: args.region.clone(),
        top_n: args.top,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_results: args.export.clone(),
        export_json: args.export_json.clone(),
        export_summary: args.export_summary.clone(),
    }
}

pub fn filter_from_args(args: &FilterArgs) -> Result<RegionFilter, AppError> {
    let mut ranges = Vec::new();
    for (param, min, max) in [
        (ParamName::Beta, args.min_beta, args.max_beta),
        (ParamName::Sigma, args.min_sigma, args.max_sigma),
        (ParamName::Gamma, args.min_gamma, args.max_gamma),
    ] {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(AppError::input(format!(
                    "--min-{0} ({lo}) is greater than --max-{0} ({hi}).",
                    param.display_name()
                )));
            }
        }
        if min.is_some() || max.is_some() {
            ranges.push(ParamRange { param, min, max });
        }
    }
    Ok(RegionFilter {
        require_success: args.require_success,
        exclude_bound_hits: args.exclude_bound_hits,
        ranges,
    })
}

pub fn analysis_config_from_args(args: &AnalyzeArgs) -> Result<AnalysisConfig, AppError> {
    Ok(AnalysisConfig {
        results_path: args.results.clone(),
        filter: filter_from_args(&args.filter)?,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
    })
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        out_dir: args.out.clone(),
        regions: args.regions,
        days: args.days,
        seed: args.seed,
        imd_min: args.imd_min,
        imd_max: args.imd_max,
        population_min: args.population_min,
        population_max: args.population_max,
        base: SeirParams {
            beta: args.beta,
            sigma: args.sigma,
            gamma: args.gamma,
        },
        imd_slope: SeirParams {
            beta: args.beta_slope,
            sigma: args.sigma_slope,
            gamma: args.gamma_slope,
        },
        start_date: args.start_date,
        seed_compartments: SeedCompartments::default(),
    }
}
