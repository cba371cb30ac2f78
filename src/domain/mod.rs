//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - SEIR parameters, bounds and seeded initial conditions
//! - per-region records after ingest (`RegionRecord`)
//! - fit outputs (`RegionFit`, `FitQuality`, `ResultsFile`)
//! - run configurations for each subcommand

pub mod types;

pub use types::*;
