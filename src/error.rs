//! Application error type.
//!
//! Every fallible operation in the crate returns `AppError`. The exit code
//! travels with the message so `main` can map failures to process status:
//!
//! - `2`: bad input (missing file, malformed flag, unreadable CSV/JSON)
//! - `3`: not enough usable data after ingest/filtering
//! - `4`: numerical failure (ODE solve, optimizer, singular system)

/// Input, configuration, or IO failure.
pub const EXIT_INPUT: u8 = 2;
/// Too little data survived ingest or filtering.
pub const EXIT_DATA: u8 = 3;
/// Numerical failure.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<crate::math::ode::SolveError> for AppError {
    fn from(err: crate::math::ode::SolveError) -> Self {
        AppError::numeric(format!("ODE solve failed: {err}"))
    }
}
