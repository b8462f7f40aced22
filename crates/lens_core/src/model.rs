//! Model abstraction and model modifiers.
//!
//! Visualizations need two things from a model that a plain forward pass
//! does not give: access to the activation of a chosen intermediate layer,
//! and control over the output activation (gradients should usually flow
//! through logits, not through a saturating softmax). [`VisModel`] captures
//! both by splitting the network at the watched layer.

use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisError};

/// Activation applied to the head output before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputActivation {
    /// No activation; the head output is used as-is (logits).
    #[default]
    Linear,
    /// Softmax over the class dimension.
    Softmax,
    /// Element-wise sigmoid.
    Sigmoid,
}

impl OutputActivation {
    /// Apply the activation to a `(batch, classes)` output.
    pub fn apply<B: Backend>(&self, output: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            OutputActivation::Linear => output,
            OutputActivation::Softmax => softmax(output, 1),
            OutputActivation::Sigmoid => sigmoid(output),
        }
    }
}

/// Identifies an intermediate layer of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKey {
    /// Positional index into [`VisModel::layer_names`]; negative values
    /// count from the end, so `-1` is the last feature layer.
    Index(isize),
    /// Layer name as reported by [`VisModel::layer_names`].
    Name(String),
}

impl LayerKey {
    /// Resolve this key against an ordered list of layer names.
    ///
    /// # Errors
    ///
    /// Returns [`VisError::UnknownLayer`] when the index is out of range or
    /// the name is not present.
    pub fn resolve(&self, names: &[String]) -> Result<usize> {
        let unknown = || VisError::UnknownLayer {
            requested: self.to_string(),
            available: names.to_vec(),
        };
        match self {
            LayerKey::Index(i) => {
                let n = names.len() as isize;
                let idx = if *i < 0 { n + *i } else { *i };
                if idx < 0 || idx >= n {
                    return Err(unknown());
                }
                Ok(idx as usize)
            }
            LayerKey::Name(name) => names
                .iter()
                .position(|candidate| candidate == name)
                .ok_or_else(unknown),
        }
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKey::Index(i) => write!(f, "#{i}"),
            LayerKey::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A model viewed through the lens of one intermediate layer.
///
/// Implementors split their forward pass at the watched layer:
/// [`forward_features`](VisModel::forward_features) runs the input up to
/// (and including) that layer, [`forward_head`](VisModel::forward_head)
/// runs the rest. CAM methods read and differentiate the feature
/// activation; saliency and maximization only need the composition.
///
/// The toolkit never mutates model weights. Visualizers take the model by
/// value; clone before constructing one if you want to keep the original.
///
/// # Shape convention
///
/// Inputs are `(batch, channels, height, width)`, feature activations
/// `(batch, k, ah, aw)`, head outputs `(batch, classes)`.
pub trait VisModel<B: Backend> {
    /// Forward pass up to the watched intermediate layer.
    fn forward_features(&self, input: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Forward pass from the watched layer's activation to the raw output.
    fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Full forward pass returning the raw (pre-activation) output.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_head(self.forward_features(input))
    }

    /// Full forward pass with the output activation applied.
    fn predict(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.output_activation().apply(self.forward(input))
    }

    /// Activation applied to the head output before scoring.
    fn output_activation(&self) -> OutputActivation {
        OutputActivation::Linear
    }

    /// Return the model with a different output activation.
    ///
    /// The default implementation ignores the request; models that bake a
    /// softmax into their head should store the activation as data and
    /// honor this instead.
    #[must_use]
    fn with_output_activation(self, activation: OutputActivation) -> Self
    where
        Self: Sized,
    {
        let _ = activation;
        self
    }

    /// Ordered names of the layers that can be watched, if the model
    /// supports re-targeting.
    fn layer_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Return the model watching a different intermediate layer.
    ///
    /// # Errors
    ///
    /// The default implementation rejects every key; models that support
    /// re-targeting resolve the key against [`layer_names`](Self::layer_names).
    fn with_feature_layer(self, layer: &LayerKey) -> Result<Self>
    where
        Self: Sized,
    {
        Err(VisError::UnknownLayer {
            requested: layer.to_string(),
            available: self.layer_names(),
        })
    }
}

/// A one-time structural transform of a model, applied before analysis.
///
/// Modifiers compose sequentially and order matters; see
/// [`ModifierPipeline`].
pub trait ModelModifier<B: Backend, M: VisModel<B>>: Send + Sync {
    /// Apply the modifier, consuming the model.
    fn apply(&self, model: M) -> Result<M>;

    /// Get the modifier name for logging/debugging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// An ordered sequence of model modifiers.
///
/// # Example
///
/// ```rust,ignore
/// use lens_core::{LayerKey, ModifierPipeline, ReplaceToLinear, SelectFeatureLayer};
///
/// let model = ModifierPipeline::new()
///     .with(ReplaceToLinear)
///     .with(SelectFeatureLayer::index(-1))
///     .apply(model)?;
/// ```
#[derive(Default)]
pub struct ModifierPipeline<B: Backend, M: VisModel<B>> {
    modifiers: Vec<Box<dyn ModelModifier<B, M>>>,
}

impl<B: Backend, M: VisModel<B>> ModifierPipeline<B, M> {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modifiers: Vec::new(),
        }
    }

    /// Append a modifier.
    pub fn push<T: ModelModifier<B, M> + 'static>(&mut self, modifier: T) {
        self.modifiers.push(Box::new(modifier));
    }

    /// Append a modifier, builder style.
    #[must_use]
    pub fn with<T: ModelModifier<B, M> + 'static>(mut self, modifier: T) -> Self {
        self.push(modifier);
        self
    }

    /// Number of modifiers in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    /// Whether the pipeline is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Apply all modifiers in order.
    pub fn apply(&self, model: M) -> Result<M> {
        let mut model = model;
        for modifier in &self.modifiers {
            tracing::debug!("applying model modifier {}", modifier.name());
            model = modifier.apply(model)?;
        }
        Ok(model)
    }
}

/// Forces a linear output activation so gradients flow through logits.
///
/// The usual first modifier for gradient-based methods on models whose
/// deployed head applies a softmax.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceToLinear;

impl<B: Backend, M: VisModel<B>> ModelModifier<B, M> for ReplaceToLinear {
    fn apply(&self, model: M) -> Result<M> {
        Ok(model.with_output_activation(OutputActivation::Linear))
    }

    fn name(&self) -> &str {
        "ReplaceToLinear"
    }
}

/// Re-targets the watched intermediate layer.
#[derive(Debug, Clone)]
pub struct SelectFeatureLayer {
    layer: LayerKey,
}

impl SelectFeatureLayer {
    /// Watch the layer at `index` (negative counts from the end).
    #[must_use]
    pub fn index(index: isize) -> Self {
        Self {
            layer: LayerKey::Index(index),
        }
    }

    /// Watch the layer with the given name.
    #[must_use]
    pub fn name(name: &str) -> Self {
        Self {
            layer: LayerKey::Name(name.to_string()),
        }
    }

    /// The configured layer key.
    #[must_use]
    pub fn layer(&self) -> &LayerKey {
        &self.layer
    }
}

impl<B: Backend, M: VisModel<B>> ModelModifier<B, M> for SelectFeatureLayer {
    fn apply(&self, model: M) -> Result<M> {
        model.with_feature_layer(&self.layer)
    }

    fn name(&self) -> &str {
        "SelectFeatureLayer"
    }
}
