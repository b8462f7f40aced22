//! # lens_core
//!
//! Core types for burn-lens model visualization.
//!
//! This crate provides:
//! - [`Score`] functions reducing model outputs to per-sample scalars
//! - [`VisModel`] for watching an intermediate layer of a model
//! - [`ModelModifier`] and [`ModifierPipeline`] for one-time model transforms
//! - [`ExplanationMap`] / [`GeneratedInputs`] result containers
//! - [`Seed`] for deterministic random number generation
//!
//! ## Shape convention
//!
//! Inputs follow the convention `(B, C, H, W)`:
//! - `B`: batch size (number of samples)
//! - `C`: channels
//! - `H`, `W`: spatial dimensions
//!
//! Model outputs are `(B, classes)`, intermediate activations `(B, K, AH, AW)`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod map;
mod model;
mod score;
mod seed;

pub use error::{Result, VisError};
pub use map::{resize_spatial, ExplanationMap, GeneratedInputs, MapMethod};
pub use model::{
    LayerKey, ModelModifier, ModifierPipeline, OutputActivation, ReplaceToLinear,
    SelectFeatureLayer, VisModel,
};
pub use score::{BinaryScore, CategoricalScore, InactiveScore, Score, ScoreFn};
pub use seed::Seed;

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;
}
