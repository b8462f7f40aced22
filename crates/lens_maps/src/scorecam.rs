//! Score-weighted class activation mapping (ScoreCAM and Faster ScoreCAM).

use std::marker::PhantomData;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use lens_core::{
    resize_spatial, ExplanationMap, MapMethod, ModifierPipeline, Result, Score, VisError, VisModel,
};

use crate::pass::check_batch;

/// Guard against division by zero when normalizing masks.
const EPSILON: f32 = 1e-7;

/// Configuration for [`Scorecam`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecamConfig {
    /// Upper bound on the number of samples per masked forward pass.
    pub batch_size: usize,
    /// Keep only the highest-variance channels (Faster ScoreCAM).
    /// `None` evaluates every channel.
    pub max_channels: Option<usize>,
    /// Resize the map to the input's spatial size.
    pub expand: bool,
    /// Min-max normalize each sample's map into `[0, 1]`.
    pub normalize: bool,
}

impl Default for ScorecamConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_channels: None,
            expand: true,
            normalize: true,
        }
    }
}

impl ScorecamConfig {
    /// Faster ScoreCAM configuration keeping the `max_channels`
    /// highest-variance channels.
    #[must_use]
    pub fn faster(max_channels: usize) -> Self {
        Self {
            max_channels: Some(max_channels),
            ..Default::default()
        }
    }

    /// Set the masked-forward batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Keep the map at the watched layer's resolution.
    #[must_use]
    pub fn without_expansion(mut self) -> Self {
        self.expand = false;
        self
    }

    /// Disable per-sample normalization.
    #[must_use]
    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }
}

/// ScoreCAM: gradient-free class activation mapping.
///
/// Each channel of the watched activation is upsampled, normalized into a
/// `[0, 1]` mask, and multiplied with the input; the score of each masked
/// input becomes that channel's weight. No backward pass is needed, so the
/// visualizer works on any backend — at the price of one forward pass per
/// channel. For wide layers prefer Faster ScoreCAM
/// ([`ScorecamConfig::faster`]), which evaluates only the
/// highest-variance channels.
///
/// Reference: Wang et al., "Score-CAM: Score-Weighted Visual Explanations
/// for Convolutional Neural Networks", CVPRW 2020.
///
/// # Example
///
/// ```rust,ignore
/// use lens_maps::{Scorecam, ScorecamConfig};
///
/// let scorecam = Scorecam::new(model);
/// let map = scorecam.explain(&score, input, &ScorecamConfig::faster(16))?;
/// ```
pub struct Scorecam<B, M>
where
    B: Backend,
    M: VisModel<B>,
{
    model: M,
    _backend: PhantomData<B>,
}

impl<B, M> Scorecam<B, M>
where
    B: Backend,
    M: VisModel<B>,
{
    /// Create a ScoreCAM visualizer for the given model.
    pub fn new(model: M) -> Self {
        Self {
            model,
            _backend: PhantomData,
        }
    }

    /// Create a visualizer after running the model through a modifier
    /// pipeline.
    pub fn from_modified(model: M, modifiers: &ModifierPipeline<B, M>) -> Result<Self> {
        Ok(Self::new(modifiers.apply(model)?))
    }

    /// Compute the class activation map of `score` for `input`.
    ///
    /// # Errors
    ///
    /// Fails on a zero `batch_size` or `max_channels`, or when the score
    /// output does not match the masked batch.
    pub fn explain(
        &self,
        score: &dyn Score<B>,
        input: Tensor<B, 4>,
        config: &ScorecamConfig,
    ) -> Result<ExplanationMap<B>> {
        if config.batch_size == 0 {
            return Err(VisError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if config.max_channels == Some(0) {
            return Err(VisError::InvalidConfig(
                "max_channels must be at least 1".to_string(),
            ));
        }

        let [batch, _, height, width] = input.dims();

        let activations = self.model.forward_features(input.clone());
        let activations = match config.max_channels {
            Some(limit) => top_variance_channels(activations, limit)?,
            None => activations,
        };
        let [_, channels, _, _] = activations.dims();

        // Per-channel masks: upsample, then min-max normalize each slice.
        let upsampled = resize_spatial(activations.clone(), [height, width]);
        let mask_min = upsampled.clone().min_dim(3).min_dim(2);
        let mask_max = upsampled.clone().max_dim(3).max_dim(2);
        let masks = (upsampled - mask_min.clone()) / (mask_max - mask_min + EPSILON);

        // Forward the masked inputs in chunks and collect channel scores.
        let channels_per_pass = (config.batch_size / batch).max(1);
        tracing::debug!(
            channels,
            channels_per_pass,
            "score-cam evaluating masked inputs"
        );

        let mut channel_scores: Vec<Tensor<B, 1>> = Vec::with_capacity(channels);
        let mut channel = 0;
        while channel < channels {
            let take = channels_per_pass.min(channels - channel);
            let masked: Vec<Tensor<B, 4>> = (channel..channel + take)
                .map(|j| input.clone() * masks.clone().narrow(1, j, 1))
                .collect();

            let output = self.model.predict(Tensor::cat(masked, 0));
            let values = score.evaluate(output)?;
            check_batch(values.dims()[0], take * batch)?;

            for t in 0..take {
                channel_scores.push(values.clone().narrow(0, t * batch, batch));
            }
            channel += take;
        }

        // Score-weighted channel sum over the raw activation.
        let weights = Tensor::stack::<2>(channel_scores, 1).reshape([batch, channels, 1, 1]);
        let cam = (activations * weights).sum_dim(1).clamp_min(0.0);
        let cam = if config.expand {
            resize_spatial(cam, [height, width])
        } else {
            cam
        };

        let map = ExplanationMap::new(cam.squeeze::<3>(1), MapMethod::ScoreCam);
        Ok(if config.normalize { map.normalized() } else { map })
    }
}

/// Keep the `limit` channels with the largest variance over batch and space.
///
/// Channel order is preserved, so a limit at or above the channel count
/// returns the activation unchanged.
fn top_variance_channels<B: Backend>(
    activations: Tensor<B, 4>,
    limit: usize,
) -> Result<Tensor<B, 4>> {
    let [_, channels, _, _] = activations.dims();
    if limit >= channels {
        return Ok(activations);
    }

    let mean = activations
        .clone()
        .mean_dim(3)
        .mean_dim(2)
        .mean_dim(0);
    let mean_sq = (activations.clone() * activations.clone())
        .mean_dim(3)
        .mean_dim(2)
        .mean_dim(0);
    let variance: Vec<f32> = (mean_sq - mean.clone() * mean)
        .reshape([channels])
        .into_data()
        .to_vec()
        .map_err(|e| VisError::Other(format!("tensor data conversion failed: {e:?}")))?;

    let mut order: Vec<usize> = (0..channels).collect();
    order.sort_by(|&a, &b| {
        variance[b]
            .partial_cmp(&variance[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep: Vec<i32> = order[..limit].iter().map(|&i| i as i32).collect();
    keep.sort_unstable();

    tracing::debug!(kept = limit, of = channels, "subsampling activation channels");

    let indices = Tensor::<B, 1, Int>::from_ints(keep.as_slice(), &activations.device());
    Ok(activations.select(1, indices))
}
