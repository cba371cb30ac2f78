//! `tracing` subscriber setup.
//!
//! Logs go to stderr so stdout stays clean for reports and plots.
//! `RUST_LOG` always wins over the defaults chosen here.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a run.
///
/// - `quiet` (the TUI owns the terminal): `off`
/// - `verbose`: `seir_fit=debug,warn`
/// - otherwise: `seir_fit=info,warn`
pub fn default_directives(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "off"
    } else if verbose {
        "seir_fit=debug,warn"
    } else {
        "seir_fit=info,warn"
    }
}

pub fn init_logger(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose, quiet)));

    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
