//! Mathematical utilities: ODE integration, least squares, special functions.

pub mod ode;
pub mod ols;
pub mod special;

pub use ols::*;
