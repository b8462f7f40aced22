//! # lens_maps
//!
//! Single-pass visualization recipes for burn-lens:
//!
//! - [`Saliency`]: input-gradient maps (vanilla and SmoothGrad)
//! - [`Gradcam`] / [`GradcamPlusPlus`]: gradient-weighted class activation maps
//! - [`Scorecam`]: gradient-free, score-weighted class activation maps
//!
//! All visualizers are constructed around a model implementing
//! [`lens_core::VisModel`], optionally transformed through a
//! [`lens_core::ModifierPipeline`], and return one heatmap per input sample.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod gradcam;
mod pass;
mod saliency;
mod scorecam;

pub use gradcam::{Gradcam, GradcamConfig, GradcamPlusPlus};
pub use saliency::{ChannelReduction, Saliency, SaliencyConfig};
pub use scorecam::{Scorecam, ScorecamConfig};
