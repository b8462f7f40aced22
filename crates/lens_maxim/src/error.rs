//! Error types for activation maximization.

use thiserror::Error;

/// Result type alias for maximization operations.
pub type Result<T> = std::result::Result<T, MaximError>;

/// Errors that can occur while maximizing a score.
#[derive(Error, Debug)]
pub enum MaximError {
    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] lens_core::VisError),

    /// A callback failed or rejected the run.
    #[error("Callback error: {0}")]
    CallbackError(String),

    /// Invalid seed input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}
