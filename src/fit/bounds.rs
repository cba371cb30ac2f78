//! Bound handling via change of variables.
//!
//! The optimizer works on an unconstrained internal vector. Each bounded
//! parameter is mapped through a smooth transform so that any internal value
//! lands inside its box:
//!
//! - `[min, max]`: `x = min + (sin(u) + 1)(max - min)/2`
//! - `[min, ∞)`:   `x = min - 1 + sqrt(u² + 1)`
//! - `(-∞, max]`:  `x = max + 1 - sqrt(u² + 1)`
//!
//! This is the MINPACK-style scheme: the fit can reach a bound but never leave
//! the box, and no projection step is needed inside the optimizer.

use crate::domain::ParamBounds;

/// Clamp `value` into `bounds` and return its internal coordinate.
pub fn to_internal(value: f64, bounds: ParamBounds) -> f64 {
    let v = bounds.clamp(value);
    match (bounds.min, bounds.max) {
        (Some(min), Some(max)) => {
            let span = max - min;
            if span <= 0.0 {
                return 0.0;
            }
            (2.0 * (v - min) / span - 1.0).clamp(-1.0, 1.0).asin()
        }
        (Some(min), None) => ((v - min + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        (None, Some(max)) => ((max - v + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        (None, None) => v,
    }
}

/// Map an internal coordinate back into the box.
pub fn to_external(internal: f64, bounds: ParamBounds) -> f64 {
    match (bounds.min, bounds.max) {
        (Some(min), Some(max)) => min + (internal.sin() + 1.0) * (max - min) / 2.0,
        (Some(min), None) => min - 1.0 + (internal * internal + 1.0).sqrt(),
        (None, Some(max)) => max + 1.0 - (internal * internal + 1.0).sqrt(),
        (None, None) => internal,
    }
}

/// Vectorized `to_internal`.
pub fn all_to_internal(values: &[f64], bounds: &[ParamBounds]) -> Vec<f64> {
    values
        .iter()
        .zip(bounds.iter())
        .map(|(&v, &b)| to_internal(v, b))
        .collect()
}

/// Vectorized `to_external`.
pub fn all_to_external(internal: &[f64], bounds: &[ParamBounds]) -> Vec<f64> {
    internal
        .iter()
        .zip(bounds.iter())
        .map(|(&u, &b)| to_external(u, b))
        .collect()
}
