//! Shared forward/backward plumbing for gradient-based maps.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use lens_core::{Result, Score, VisError, VisModel};

/// Result of one forward/backward pass differentiated at the watched layer.
pub(crate) struct FeaturePass<B: AutodiffBackend> {
    /// Activation of the watched layer.
    pub activations: Tensor<B::InnerBackend, 4>,
    /// Gradient of the score sum w.r.t. that activation.
    pub gradients: Tensor<B::InnerBackend, 4>,
    /// Per-sample score values.
    pub scores: Tensor<B::InnerBackend, 1>,
}

/// Fail fast when a score returns the wrong number of samples.
pub(crate) fn check_batch(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(VisError::ShapeMismatch(format!(
            "score produced {got} values for a batch of {expected} samples"
        )));
    }
    Ok(())
}

/// Compute the gradient of the score w.r.t. the model input.
///
/// Per-sample scores are independent, so backpropagating their sum yields
/// each sample's own gradient.
pub(crate) fn input_gradients<B, M>(
    model: &M,
    score: &dyn Score<B>,
    input: Tensor<B, 4>,
) -> Result<Tensor<B::InnerBackend, 4>>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    let [batch, _, _, _] = input.dims();
    let x = input.detach().require_grad();

    let output = model.output_activation().apply(model.forward(x.clone()));
    let values = score.evaluate(output)?;
    check_batch(values.dims()[0], batch)?;

    let grads = values.sum().backward();
    x.grad(&grads)
        .ok_or_else(|| VisError::MissingGradient("model input".to_string()))
}

/// Compute the gradient of the score w.r.t. the watched activation.
///
/// The activation is re-marked as an autodiff leaf before the head runs,
/// so one backward pass yields its gradient directly.
pub(crate) fn feature_gradients<B, M>(
    model: &M,
    score: &dyn Score<B>,
    input: Tensor<B, 4>,
) -> Result<FeaturePass<B>>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    let [batch, _, _, _] = input.dims();

    let features = model.forward_features(input).detach().require_grad();
    let output = model
        .output_activation()
        .apply(model.forward_head(features.clone()));
    let values = score.evaluate(output)?;
    check_batch(values.dims()[0], batch)?;

    let grads = values.clone().sum().backward();
    let gradients = features
        .grad(&grads)
        .ok_or_else(|| VisError::MissingGradient("watched activation".to_string()))?;

    Ok(FeaturePass {
        activations: features.inner(),
        gradients,
        scores: values.inner(),
    })
}
