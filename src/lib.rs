//! `seir-fit` library crate.
//!
//! The binary (`seir`) is a thin wrapper around this library so that:
//!
//! - the fitting and statistics code is testable without spawning processes
//! - the CLI and the TUI share one pipeline (`app::pipeline`)

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod tui;
