//! SEIR parameter estimation.
//!
//! Responsibilities:
//!
//! - map bounded parameters to unconstrained optimizer coordinates
//! - Levenberg–Marquardt least squares on ODE residuals
//! - fit a single region, then every region in parallel

pub mod batch;
pub mod bounds;
pub mod fitter;
pub mod levmar;

pub use batch::*;
pub use fitter::*;
