//! # lens
//!
//! burn-lens: visual explanations for burn models.
//!
//! The toolkit takes a trained model, a differentiable per-sample score
//! over its output, and a batch of seed inputs (or only a shape), and
//! produces the map or image that explains or maximizes that score:
//!
//! - **Saliency**: vanilla input gradients and SmoothGrad
//! - **GradCAM / GradCAM++**: gradient-weighted class activation maps
//! - **ScoreCAM**: gradient-free, score-weighted class activation maps
//! - **Activation maximization**: gradient ascent on the input with
//!   regularizers, input modifiers and per-step callbacks
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lens::prelude::*;
//!
//! // The model implements VisModel, splitting at the watched conv layer.
//! let model = MyCnn::new(&device);
//!
//! // Explain class 281 of a batch of images.
//! let score = CategoricalScore::single(281);
//! let gradcam = Gradcam::new(model.clone());
//! let map = gradcam.explain(&score, images, &GradcamConfig::default())?;
//!
//! // Or synthesize an input that maximizes the class.
//! let mut maximizer = ActivationMaximization::new(model)
//!     .with_regularizer(TotalVariation::new(0.5))
//!     .with_input_modifier(Jitter::new(4));
//! let images = maximizer.maximize_from_shape(
//!     &score,
//!     [1, 3, 224, 224],
//!     &device,
//!     &MaximizeConfig::new(256),
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use lens_core as core;
pub use lens_maps as maps;
pub use lens_maxim as maxim;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lens::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use lens_core::{
        BinaryScore, CategoricalScore, ExplanationMap, GeneratedInputs, InactiveScore, LayerKey,
        MapMethod, ModelModifier, ModifierPipeline, OutputActivation, ReplaceToLinear, Result,
        Score, ScoreFn, Seed, SelectFeatureLayer, VisError, VisModel,
    };

    // Maps
    pub use lens_maps::{
        ChannelReduction, Gradcam, GradcamConfig, GradcamPlusPlus, Saliency, SaliencyConfig,
        Scorecam, ScorecamConfig,
    };

    // Maximization
    pub use lens_maxim::{
        ActivationMaximization, GradientAscent, HistoryCallback, InputAdam, InputAdamConfig,
        Jitter, LpNorm, MaximizeConfig, PlateauStopping, ProgressCallback, Rotate, TotalVariation,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    // Additional exports
    pub use lens_core::{backend, resize_spatial};
    pub use lens_maxim::{
        CallbackSet, InputModifier, InputOptimizer, MaximError, Regularizer, StepCallback,
        StepContext,
    };
}
