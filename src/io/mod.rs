//! Input/output helpers.
//!
//! - CSV ingest of the IMD, population and case files (`ingest`)
//! - results JSON read/write (`results`)
//! - per-region CSV exports (`export`)

pub mod export;
pub mod ingest;
pub mod results;

pub use export::*;
pub use ingest::*;
pub use results::*;
