//! Error types for lens_core.

use thiserror::Error;

/// Result type alias using [`VisError`].
pub type Result<T> = std::result::Result<T, VisError>;

/// Errors that can occur while building or running a visualization.
#[derive(Error, Debug)]
pub enum VisError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Shape mismatch between tensors.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The requested intermediate layer does not exist on the model.
    #[error("Unknown layer {requested}; model exposes: {available:?}")]
    UnknownLayer {
        /// The layer key that was requested.
        requested: String,
        /// Layer names the model exposes.
        available: Vec<String>,
    },

    /// A score function rejected the model output.
    #[error("Invalid score: {0}")]
    InvalidScore(String),

    /// Backpropagation produced no gradient for the watched tensor.
    #[error("No gradient available for {0}")]
    MissingGradient(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
