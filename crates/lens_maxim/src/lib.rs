//! # lens_maxim
//!
//! Activation maximization for burn-lens: synthesize inputs that maximize
//! a score through iterative gradient ascent.
//!
//! This crate provides:
//! - [`ActivationMaximization`]: the ascent driver
//! - [`InputOptimizer`] update rules ([`InputAdam`], [`GradientAscent`])
//! - [`Regularizer`] penalties ([`TotalVariation`], [`LpNorm`])
//! - [`InputModifier`] per-step transforms ([`Jitter`], [`Rotate`])
//! - [`StepCallback`] hooks ([`ProgressCallback`], [`HistoryCallback`],
//!   [`PlateauStopping`])

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod callback;
mod error;
mod input_modifier;
mod maximizer;
mod optimizer;
mod regularizer;

pub use callback::{
    CallbackSet, HistoryCallback, PlateauStopping, ProgressCallback, StepCallback, StepContext,
};
pub use error::{MaximError, Result};
pub use input_modifier::{InputModifier, Jitter, Rotate};
pub use maximizer::{ActivationMaximization, MaximizeConfig};
pub use optimizer::{GradientAscent, InputAdam, InputAdamConfig, InputOptimizer};
pub use regularizer::{LpNorm, Regularizer, TotalVariation};
