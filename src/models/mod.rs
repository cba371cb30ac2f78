//! Compartmental model definitions.
//!
//! Models are implemented as small, pure functions so that the integrator and
//! the fitter can stay generic over the state dimension.

pub mod seir;

pub use seir::*;
