//! Input-gradient saliency maps (vanilla and SmoothGrad).

use std::marker::PhantomData;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use lens_core::{ExplanationMap, MapMethod, ModifierPipeline, Result, Score, Seed, VisModel};

use crate::pass::input_gradients;

/// How to collapse the channel axis of a gradient map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelReduction {
    /// Keep the channel with the largest value at each position.
    Max,
    /// Average across channels.
    Mean,
}

/// Configuration for [`Saliency`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaliencyConfig {
    /// Take the absolute value of the gradient (signed map when false).
    pub abs: bool,
    /// How the channel axis is collapsed into a spatial map.
    pub reduction: ChannelReduction,
    /// Min-max normalize each sample's map into `[0, 1]`.
    pub normalize: bool,
    /// Number of noisy replicas for SmoothGrad; `0` is vanilla saliency.
    pub smooth_samples: usize,
    /// Standard deviation of the SmoothGrad noise.
    pub smooth_noise: f64,
    /// Seed for the noise; unseeded runs are not reproducible.
    pub seed: Option<Seed>,
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        Self {
            abs: true,
            reduction: ChannelReduction::Max,
            normalize: true,
            smooth_samples: 0,
            smooth_noise: 0.2,
            seed: None,
        }
    }
}

impl SaliencyConfig {
    /// SmoothGrad configuration with the given replica count and noise.
    #[must_use]
    pub fn smoothgrad(samples: usize, noise: f64) -> Self {
        Self {
            smooth_samples: samples,
            smooth_noise: noise,
            ..Default::default()
        }
    }

    /// Keep the gradient sign instead of taking absolute values.
    #[must_use]
    pub fn signed(mut self) -> Self {
        self.abs = false;
        self
    }

    /// Set the channel reduction.
    #[must_use]
    pub fn with_reduction(mut self, reduction: ChannelReduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Disable per-sample normalization.
    #[must_use]
    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }

    /// Set the noise seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Gradient saliency of a score w.r.t. the model input.
///
/// Vanilla saliency is a single forward/backward pass. With
/// `smooth_samples > 0` the gradient is averaged over that many
/// Gaussian-noised replicas of the input (SmoothGrad), which trades compute
/// for a less speckled map. With one replica and zero noise, SmoothGrad
/// degenerates to vanilla saliency.
///
/// # Example
///
/// ```rust,ignore
/// use lens_maps::{Saliency, SaliencyConfig};
///
/// let saliency = Saliency::new(model);
/// let map = saliency.explain(&score, input, &SaliencyConfig::smoothgrad(20, 0.2))?;
/// ```
pub struct Saliency<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    model: M,
    _backend: PhantomData<B>,
}

impl<B, M> Saliency<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    /// Create a saliency visualizer for the given model.
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

    /// Compute the saliency map of `score` w.r.t. `input`.
    ///
    /// # Errors
    ///
    /// Fails when the score output does not match the batch, or when the
    /// input is disconnected from the score.
    pub fn explain(
        &self,
        score: &dyn Score<B>,
        input: Tensor<B, 4>,
        config: &SaliencyConfig,
    ) -> Result<ExplanationMap<B::InnerBackend>> {
        let dims = input.dims();
        let runs = config.smooth_samples.max(1);
        let with_noise = config.smooth_samples > 0 && config.smooth_noise > 0.0;

        if let Some(seed) = config.seed {
            B::seed(seed.derive("smoothgrad").value());
        }

        let base = input.inner();
        let device = base.device();
        let mut accumulated = base.zeros_like();

        for run in 0..runs {
            let replica = if with_noise {
                tracing::debug!(run, total = runs, "saliency pass over noisy replica");
                let noise = Tensor::<B::InnerBackend, 4>::random(
                    dims,
                    burn::tensor::Distribution::Normal(0.0, config.smooth_noise),
                    &device,
                );
                base.clone() + noise
            } else {
                base.clone()
            };

            let gradients = input_gradients(&self.model, score, Tensor::from_inner(replica))?;
            accumulated = accumulated + gradients;
        }

        let mut gradient = accumulated / runs as f32;
        if config.abs {
            gradient = gradient.abs();
        }

        let spatial = match config.reduction {
            ChannelReduction::Max => gradient.max_dim(1),
            ChannelReduction::Mean => gradient.mean_dim(1),
        };

        let method = if config.smooth_samples > 0 {
            MapMethod::SmoothGrad
        } else {
            MapMethod::Saliency
        };
        let map = ExplanationMap::new(spatial.squeeze::<3>(1), method);

        Ok(if config.normalize { map.normalized() } else { map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use lens_core::ScoreFn;

    type TestBackend = Autodiff<NdArray>;

    /// Features pass through; head squares and averages, so the input
    /// gradient depends on the input values.
    #[derive(Debug, Clone)]
    struct SquareModel;

    impl<B: Backend> VisModel<B> for SquareModel {
        fn forward_features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
            input
        }

        fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
            (features.clone() * features)
                .mean_dim(3)
                .mean_dim(2)
                .flatten::<2>(1, 3)
        }
    }

    fn mean_score<B: Backend>() -> ScoreFn<impl Fn(Tensor<B, 2>) -> Tensor<B, 1> + Send + Sync> {
        ScoreFn::new(|output: Tensor<B, 2>| output.mean_dim(1).squeeze::<1>(1))
    }

    #[test]
    fn test_vanilla_saliency_shape() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 6, 6],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let saliency = Saliency::new(SquareModel);
        let map = saliency
            .explain(&mean_score(), input, &SaliencyConfig::default())
            .unwrap();

        assert_eq!(map.shape(), [2, 6, 6]);
        assert_eq!(map.method(), MapMethod::Saliency);
    }

    #[test]
    fn test_smoothgrad_one_sample_zero_noise_is_vanilla() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [1, 2, 5, 5],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let saliency = Saliency::new(SquareModel);
        let score = mean_score();

        let vanilla = saliency
            .explain(&score, input.clone(), &SaliencyConfig::default())
            .unwrap();
        let smooth = saliency
            .explain(&score, input, &SaliencyConfig::smoothgrad(1, 0.0))
            .unwrap();

        assert_eq!(smooth.method(), MapMethod::SmoothGrad);

        let a: Vec<f32> = vanilla.into_values().into_data().to_vec().unwrap();
        let b: Vec<f32> = smooth.into_values().into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_smoothgrad_seeded_runs_reproduce() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [1, 1, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let saliency = Saliency::new(SquareModel);
        let score = mean_score();
        let config = SaliencyConfig::smoothgrad(4, 0.1).with_seed(Seed::new(7));

        let first = saliency.explain(&score, input.clone(), &config).unwrap();
        let second = saliency.explain(&score, input, &config).unwrap();

        let a: Vec<f32> = first.into_values().into_data().to_vec().unwrap();
        let b: Vec<f32> = second.into_values().into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_batch_matches_single_sample_runs() {
        let device = Default::default();
        let sample_a = Tensor::<TestBackend, 4>::random(
            [1, 2, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let sample_b = Tensor::<TestBackend, 4>::random(
            [1, 2, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let batch = Tensor::cat(vec![sample_a.clone(), sample_b.clone()], 0);

        let saliency = Saliency::new(SquareModel);
        let score = mean_score();
        let config = SaliencyConfig::default();

        let combined = saliency.explain(&score, batch, &config).unwrap();
        let first = saliency.explain(&score, sample_a, &config).unwrap();
        let second = saliency.explain(&score, sample_b, &config).unwrap();

        let combined: Vec<f32> = combined.into_values().into_data().to_vec().unwrap();
        let mut separate: Vec<f32> = first.into_values().into_data().to_vec().unwrap();
        separate.extend::<Vec<f32>>(second.into_values().into_data().to_vec().unwrap());

        for (x, y) in combined.iter().zip(separate.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_signed_map_keeps_negative_values() {
        let device = Default::default();
        // Negative inputs give negative gradients for the squared head.
        let input = Tensor::<TestBackend, 4>::ones([1, 1, 3, 3], &device) * (-1.0);

        let saliency = Saliency::new(SquareModel);
        let config = SaliencyConfig::default().signed().without_normalization();
        let map = saliency.explain(&mean_score(), input, &config).unwrap();

        let max: f32 = map.into_values().max().into_scalar().elem();
        assert!(max < 0.0);
    }

    #[test]
    fn test_saliency_config_serde() {
        let config = SaliencyConfig::smoothgrad(8, 0.15).with_seed(Seed::new(3));
        let json = serde_json::to_string(&config).unwrap();
        let decoded: SaliencyConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.smooth_samples, 8);
        assert_eq!(decoded.seed, Some(Seed::new(3)));
    }
}
