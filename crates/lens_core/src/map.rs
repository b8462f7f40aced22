//! Result containers for visualizations.

use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisError};

/// Guard against division by zero when normalizing.
const EPSILON: f32 = 1e-7;

/// The recipe that produced an [`ExplanationMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapMethod {
    /// Gradient-weighted class activation mapping.
    GradCam,
    /// GradCAM with second-order weight correction.
    GradCamPlusPlus,
    /// Score-weighted (gradient-free) class activation mapping.
    ScoreCam,
    /// Plain input-gradient saliency.
    Saliency,
    /// Noise-averaged input-gradient saliency.
    SmoothGrad,
}

/// A batch of spatial heatmaps, one per input sample.
///
/// Values have shape `(batch, height, width)`. The map is ephemeral: it is
/// returned by value and holds no reference to the model that produced it.
#[derive(Debug, Clone)]
pub struct ExplanationMap<B: Backend> {
    values: Tensor<B, 3>,
    method: MapMethod,
}

impl<B: Backend> ExplanationMap<B> {
    /// Create a new map.
    pub fn new(values: Tensor<B, 3>, method: MapMethod) -> Self {
        Self { values, method }
    }

    /// The method that produced this map.
    #[must_use]
    pub fn method(&self) -> MapMethod {
        self.method
    }

    /// Shape as `[batch, height, width]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        self.values.dims()
    }

    /// Borrow the underlying tensor.
    #[must_use]
    pub fn values(&self) -> &Tensor<B, 3> {
        &self.values
    }

    /// Consume the map, returning the underlying tensor.
    #[must_use]
    pub fn into_values(self) -> Tensor<B, 3> {
        self.values
    }

    /// Min-max normalize each sample's heatmap into `[0, 1]`.
    ///
    /// A constant heatmap normalizes to all zeros.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let min = self.values.clone().min_dim(2).min_dim(1);
        let max = self.values.clone().max_dim(2).max_dim(1);
        let range = max - min.clone();

        Self {
            values: (self.values.clone() - min) / (range + EPSILON),
            method: self.method,
        }
    }

    /// Split the batch into per-sample `(height, width)` tensors.
    #[must_use]
    pub fn into_samples(self) -> Vec<Tensor<B, 2>> {
        let [batch, _, _] = self.values.dims();
        (0..batch)
            .map(|i| self.values.clone().narrow(0, i, 1).squeeze::<2>(0))
            .collect()
    }

    /// Convert the batch into per-sample ndarray arrays.
    pub fn to_arrays(&self) -> Result<Vec<Array2<f32>>> {
        let [batch, height, width] = self.values.dims();
        let data: Vec<f32> = self
            .values
            .clone()
            .into_data()
            .to_vec()
            .map_err(|e| VisError::Other(format!("tensor data conversion failed: {e:?}")))?;

        let stride = height * width;
        (0..batch)
            .map(|i| {
                Array2::from_shape_vec((height, width), data[i * stride..(i + 1) * stride].to_vec())
                    .map_err(|e| VisError::Other(e.to_string()))
            })
            .collect()
    }
}

/// A batch of synthesized inputs produced by activation maximization.
///
/// Values have shape `(batch, channels, height, width)`.
#[derive(Debug, Clone)]
pub struct GeneratedInputs<B: Backend> {
    values: Tensor<B, 4>,
}

impl<B: Backend> GeneratedInputs<B> {
    /// Create a new batch of generated inputs.
    pub fn new(values: Tensor<B, 4>) -> Self {
        Self { values }
    }

    /// Shape as `[batch, channels, height, width]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        self.values.dims()
    }

    /// Borrow the underlying tensor.
    #[must_use]
    pub fn values(&self) -> &Tensor<B, 4> {
        &self.values
    }

    /// Consume, returning the underlying tensor.
    #[must_use]
    pub fn into_values(self) -> Tensor<B, 4> {
        self.values
    }

    /// Split the batch into per-sample `(channels, height, width)` tensors.
    #[must_use]
    pub fn into_samples(self) -> Vec<Tensor<B, 3>> {
        let [batch, _, _, _] = self.values.dims();
        (0..batch)
            .map(|i| self.values.clone().narrow(0, i, 1).squeeze::<3>(0))
            .collect()
    }

    /// Convert the batch into per-sample ndarray arrays.
    pub fn to_arrays(&self) -> Result<Vec<Array3<f32>>> {
        let [batch, channels, height, width] = self.values.dims();
        let data: Vec<f32> = self
            .values
            .clone()
            .into_data()
            .to_vec()
            .map_err(|e| VisError::Other(format!("tensor data conversion failed: {e:?}")))?;

        let stride = channels * height * width;
        (0..batch)
            .map(|i| {
                Array3::from_shape_vec(
                    (channels, height, width),
                    data[i * stride..(i + 1) * stride].to_vec(),
                )
                .map_err(|e| VisError::Other(e.to_string()))
            })
            .collect()
    }
}

/// Bilinearly resize the spatial dimensions of a `(b, c, h, w)` tensor.
///
/// Returns the input unchanged when it already has the requested size.
pub fn resize_spatial<B: Backend>(values: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [_, _, height, width] = values.dims();
    if [height, width] == size {
        return values;
    }
    interpolate(
        values,
        size,
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_map_shape_and_method() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 3>::zeros([2, 4, 4], &device);
        let map = ExplanationMap::new(values, MapMethod::GradCam);

        assert_eq!(map.shape(), [2, 4, 4]);
        assert_eq!(map.method(), MapMethod::GradCam);
    }

    #[test]
    fn test_map_normalized_range() {
        let device = Default::default();
        let data: Vec<f32> = (0..32).map(|i| i as f32).collect();
        let values = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device)
            .reshape([2, 4, 4]);
        let map = ExplanationMap::new(values, MapMethod::Saliency).normalized();

        let min: f32 = map.values().clone().min().into_scalar().elem();
        let max: f32 = map.values().clone().max().into_scalar().elem();
        assert!(min >= -1e-6);
        assert!(max <= 1.0 + 1e-6);

        // Each sample is normalized independently, so both reach ~1.0.
        let per_sample_max: Vec<f32> = map
            .values()
            .clone()
            .max_dim(2)
            .max_dim(1)
            .into_data()
            .to_vec()
            .unwrap();
        for value in per_sample_max {
            assert!((value - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_map_normalized_constant_is_zero() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 3>::ones([1, 3, 3], &device);
        let map = ExplanationMap::new(values, MapMethod::ScoreCam).normalized();

        let sum: f32 = map.values().clone().sum().into_scalar().elem();
        assert!(sum.abs() < 1e-4);
    }

    #[test]
    fn test_map_into_samples() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 3>::zeros([3, 5, 7], &device);
        let samples = ExplanationMap::new(values, MapMethod::GradCam).into_samples();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].dims(), [5, 7]);
    }

    #[test]
    fn test_map_to_arrays() {
        let device = Default::default();
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let values = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device)
            .reshape([2, 2, 2]);
        let arrays = ExplanationMap::new(values, MapMethod::Saliency)
            .to_arrays()
            .unwrap();

        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].dim(), (2, 2));
        assert!((arrays[1][[0, 0]] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_generated_inputs_samples() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 4>::zeros([2, 3, 8, 8], &device);
        let generated = GeneratedInputs::new(values);

        assert_eq!(generated.shape(), [2, 3, 8, 8]);
        let samples = generated.into_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].dims(), [3, 8, 8]);
    }

    #[test]
    fn test_resize_spatial_noop() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 4>::ones([1, 1, 4, 4], &device);
        let resized = resize_spatial(values, [4, 4]);
        assert_eq!(resized.dims(), [1, 1, 4, 4]);
    }

    #[test]
    fn test_resize_spatial_constant_stays_constant() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 4>::ones([1, 2, 4, 4], &device);
        let resized = resize_spatial(values, [8, 8]);

        assert_eq!(resized.dims(), [1, 2, 8, 8]);
        let min: f32 = resized.clone().min().into_scalar().elem();
        let max: f32 = resized.max().into_scalar().elem();
        assert!((min - 1.0).abs() < 1e-5);
        assert!((max - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_map_method_serde() {
        let method = MapMethod::GradCamPlusPlus;
        let json = serde_json::to_string(&method).unwrap();
        let decoded: MapMethod = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, method);
    }
}
