//! SEIR right-hand side.
//!
//! State layout is `[S, E, I, R]`. With `N = S + E + I + R`:
//!
//! ```text
//! dS/dt = -β S I / N
//! dE/dt =  β S I / N - σ E
//! dI/dt =  σ E - γ I
//! dR/dt =  γ I
//! ```
//!
//! The four derivatives sum to zero, so `N` is conserved along a trajectory.

use crate::domain::{InitialConditions, SeirParams};

/// `[S, E, I, R]`.
pub type SeirState = [f64; 4];

/// Index of the infected compartment in `SeirState`.
pub const INFECTED: usize = 2;

/// Evaluate the SEIR derivatives at `state`.
pub fn derivatives(state: &SeirState, params: &SeirParams) -> SeirState {
    let [s, e, i, r] = *state;
    let n = s + e + i + r;

    // An empty population has no force of infection.
    let infection = if n > 0.0 { params.beta * s * i / n } else { 0.0 };
    let incubation = params.sigma * e;
    let recovery = params.gamma * i;

    [
        -infection,
        infection - incubation,
        incubation - recovery,
        recovery,
    ]
}

/// Build `[S0, E0, I0, R0]` from seeded compartments.
pub fn initial_state(ic: &InitialConditions) -> SeirState {
    [ic.susceptible(), ic.exposed, ic.infected, ic.recovered]
}
