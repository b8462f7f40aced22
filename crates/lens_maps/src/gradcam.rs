//! Gradient-weighted class activation mapping (GradCAM and GradCAM++).

use std::marker::PhantomData;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use lens_core::{
    resize_spatial, ExplanationMap, MapMethod, ModifierPipeline, Result, Score, VisModel,
};

use crate::pass::{feature_gradients, FeaturePass};

/// Configuration shared by [`Gradcam`] and [`GradcamPlusPlus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradcamConfig {
    /// Resize the map to the input's spatial size.
    pub expand: bool,
    /// Min-max normalize each sample's map into `[0, 1]`.
    pub normalize: bool,
}

impl Default for GradcamConfig {
    fn default() -> Self {
        Self {
            expand: true,
            normalize: true,
        }
    }
}

impl GradcamConfig {
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

/// Weighted channel sum, rectification, resize, normalization.
///
/// The tail end shared by every CAM recipe: `weights` are per-channel
/// `(b, k, 1, 1)`, `activations` are `(b, k, ah, aw)`.
fn finish_cam<B: Backend>(
    activations: Tensor<B, 4>,
    weights: Tensor<B, 4>,
    input_size: [usize; 2],
    config: &GradcamConfig,
    method: MapMethod,
) -> Result<ExplanationMap<B>> {
    let cam = (activations * weights).sum_dim(1).clamp_min(0.0);
    let cam = if config.expand {
        resize_spatial(cam, input_size)
    } else {
        cam
    };

    let map = ExplanationMap::new(cam.squeeze::<3>(1), method);
    Ok(if config.normalize { map.normalized() } else { map })
}

/// GradCAM: spatial heatmaps from score gradients at an intermediate layer.
///
/// One forward pass captures the watched activation, one backward pass
/// yields the score's gradient w.r.t. it. Channel weights are the spatial
/// mean of that gradient; the map is the rectified weighted channel sum.
///
/// Reference: Selvaraju et al., "Grad-CAM: Visual Explanations from Deep
/// Networks via Gradient-based Localization", ICCV 2017.
///
/// # Example
///
/// ```rust,ignore
/// use lens_maps::{Gradcam, GradcamConfig};
///
/// let gradcam = Gradcam::new(model);
/// let map = gradcam.explain(&score, input, &GradcamConfig::default())?;
/// ```
pub struct Gradcam<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    model: M,
    _backend: PhantomData<B>,
}

impl<B, M> Gradcam<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    /// Create a GradCAM visualizer for the given model.
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
    /// Fails when the score output does not match the batch, or when the
    /// watched activation is disconnected from the score.
    pub fn explain(
        &self,
        score: &dyn Score<B>,
        input: Tensor<B, 4>,
        config: &GradcamConfig,
    ) -> Result<ExplanationMap<B::InnerBackend>> {
        let [_, _, height, width] = input.dims();
        let pass = feature_gradients(&self.model, score, input)?;

        // Global average pool the gradients into per-channel weights.
        let weights = pass.gradients.mean_dim(3).mean_dim(2);

        finish_cam(
            pass.activations,
            weights,
            [height, width],
            config,
            MapMethod::GradCam,
        )
    }
}

/// GradCAM++: GradCAM with second-order-corrected channel weights.
///
/// Weights each gradient location by an alpha term derived from squared and
/// cubed gradients (scaled by the exponential of the score), which sharpens
/// maps when several instances of a class appear in one image.
///
/// Reference: Chattopadhay et al., "Grad-CAM++: Generalized Gradient-based
/// Visual Explanations for Deep Convolutional Networks", WACV 2018.
pub struct GradcamPlusPlus<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    model: M,
    _backend: PhantomData<B>,
}

impl<B, M> GradcamPlusPlus<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    /// Create a GradCAM++ visualizer for the given model.
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
    /// Same failure modes as [`Gradcam::explain`].
    pub fn explain(
        &self,
        score: &dyn Score<B>,
        input: Tensor<B, 4>,
        config: &GradcamConfig,
    ) -> Result<ExplanationMap<B::InnerBackend>> {
        let [_, _, height, width] = input.dims();
        let pass = feature_gradients(&self.model, score, input)?;
        let weights = Self::corrected_weights(&pass);

        finish_cam(
            pass.activations,
            weights,
            [height, width],
            config,
            MapMethod::GradCamPlusPlus,
        )
    }

    /// Second-order-corrected channel weights, `(b, k, 1, 1)`.
    fn corrected_weights(pass: &FeaturePass<B>) -> Tensor<B::InnerBackend, 4> {
        let [batch, _, _, _] = pass.activations.dims();
        let score_exp = pass.scores.clone().exp().reshape([batch, 1, 1, 1]);

        let first = pass.gradients.clone() * score_exp;
        let second = first.clone() * pass.gradients.clone();
        let third = second.clone() * pass.gradients.clone();

        // Spatial sum of the activation enters the alpha denominator.
        let global_sum = pass.activations.clone().sum_dim(3).sum_dim(2);

        let denominator = second.clone() * 2.0 + third * global_sum;
        let zero_denominator = denominator.clone().equal_elem(0.0);
        let denominator = denominator
            .clone()
            .mask_where(zero_denominator, denominator.ones_like());

        let alphas = second / denominator;
        let alpha_sum = alphas.clone().sum_dim(3).sum_dim(2);
        let zero_alpha_sum = alpha_sum.clone().equal_elem(0.0);
        let alpha_sum = alpha_sum
            .clone()
            .mask_where(zero_alpha_sum, alpha_sum.ones_like());
        let alphas = alphas / alpha_sum;

        (alphas * first.clamp_min(0.0)).sum_dim(3).sum_dim(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use lens_core::ScoreFn;

    type TestBackend = Autodiff<NdArray>;

    /// Features pass through unchanged; head averages spatially.
    #[derive(Debug, Clone)]
    struct PassThrough;

    impl<B: Backend> VisModel<B> for PassThrough {
        fn forward_features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
            input
        }

        fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
            features.mean_dim(3).mean_dim(2).flatten::<2>(1, 3)
        }
    }

    /// Two feature channels combined with opposite signs, so gradients
    /// (and unrectified sums) can go negative.
    #[derive(Debug, Clone)]
    struct SignedHead;

    impl<B: Backend> VisModel<B> for SignedHead {
        fn forward_features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
            input
        }

        fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
            let pooled = features.mean_dim(3).mean_dim(2).flatten::<2>(1, 3);
            let head = Tensor::<B, 2>::from_floats([[1.0], [-1.0]], &pooled.device());
            pooled.matmul(head)
        }
    }

    fn first_class_score<B: Backend>(
    ) -> ScoreFn<impl Fn(Tensor<B, 2>) -> Tensor<B, 1> + Send + Sync> {
        ScoreFn::new(|output: Tensor<B, 2>| output.narrow(1, 0, 1).squeeze::<1>(1))
    }

    #[test]
    fn test_gradcam_single_channel_recovers_activation() {
        let device = Default::default();
        // All-positive single-channel input; the watched activation is the
        // input itself and the gradient is spatially uniform, so the
        // normalized map must equal the normalized activation.
        let data: Vec<f32> = (1..=16).map(|i| i as f32).collect();
        let input = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device)
            .reshape([1, 1, 4, 4]);

        let gradcam = Gradcam::new(PassThrough);
        let map = gradcam
            .explain(&first_class_score(), input.clone(), &GradcamConfig::default())
            .unwrap();

        let expected = ExplanationMap::new(
            input.inner().squeeze::<3>(1),
            MapMethod::GradCam,
        )
        .normalized();

        let got: Vec<f32> = map.into_values().into_data().to_vec().unwrap();
        let want: Vec<f32> = expected.into_values().into_data().to_vec().unwrap();
        for (x, y) in got.iter().zip(want.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gradcam_is_non_negative() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [2, 2, 6, 6],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let gradcam = Gradcam::new(SignedHead);
        let config = GradcamConfig::default().without_normalization();
        let map = gradcam
            .explain(&first_class_score(), input, &config)
            .unwrap();

        let min: f32 = map.into_values().min().into_scalar().elem();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_gradcam_expand_matches_input_size() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [1, 2, 8, 8],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let gradcam = Gradcam::new(PassThrough);
        let map = gradcam
            .explain(&first_class_score(), input.clone(), &GradcamConfig::default())
            .unwrap();
        assert_eq!(map.shape(), [1, 8, 8]);

        let config = GradcamConfig::default().without_expansion();
        let raw = gradcam
            .explain(&first_class_score(), input, &config)
            .unwrap();
        assert_eq!(raw.shape(), [1, 8, 8]);
    }

    #[test]
    fn test_gradcam_plus_plus_non_negative_and_shaped() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [2, 2, 5, 5],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let cam = GradcamPlusPlus::new(SignedHead);
        let config = GradcamConfig::default().without_normalization();
        let map = cam.explain(&first_class_score(), input, &config).unwrap();

        assert_eq!(map.method(), MapMethod::GradCamPlusPlus);
        assert_eq!(map.shape(), [2, 5, 5]);
        let min: f32 = map.into_values().min().into_scalar().elem();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_gradcam_deterministic() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [1, 2, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let gradcam = Gradcam::new(PassThrough);
        let score = first_class_score();
        let config = GradcamConfig::default();

        let first = gradcam.explain(&score, input.clone(), &config).unwrap();
        let second = gradcam.explain(&score, input, &config).unwrap();

        let a: Vec<f32> = first.into_values().into_data().to_vec().unwrap();
        let b: Vec<f32> = second.into_values().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_gradcam_config_serde() {
        let config = GradcamConfig::default().without_expansion();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: GradcamConfig = serde_json::from_str(&json).unwrap();
        assert!(!decoded.expand);
        assert!(decoded.normalize);
    }
}
