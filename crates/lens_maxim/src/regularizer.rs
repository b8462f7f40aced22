//! Penalty terms keeping synthesized inputs realistic.

use burn::prelude::*;

use lens_core::{Result, VisError};

/// A weighted penalty on the optimized input.
///
/// Penalties are subtracted from the score during maximization, so they
/// must be differentiable through the backend. Each returns one value per
/// sample; nothing couples samples across the batch.
pub trait Regularizer<B: Backend>: Send + Sync {
    /// Per-sample penalty, shape `(batch,)`.
    fn penalty(&self, input: Tensor<B, 4>) -> Tensor<B, 1>;

    /// Get the regularizer name for logging/debugging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Anisotropic total variation, discouraging high-frequency noise.
///
/// Sums absolute differences between spatially adjacent values, normalized
/// by the element count.
#[derive(Debug, Clone, Copy)]
pub struct TotalVariation {
    weight: f32,
}

impl TotalVariation {
    /// Create a total-variation penalty with the given weight.
    #[must_use]
    pub fn new(weight: f32) -> Self {
        Self { weight }
    }

    /// The configured weight.
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }
}

impl<B: Backend> Regularizer<B> for TotalVariation {
    fn penalty(&self, input: Tensor<B, 4>) -> Tensor<B, 1> {
        let [batch, channels, height, width] = input.dims();
        let device = input.device();
        let numel = (channels * height * width) as f32;

        let mut total = Tensor::<B, 1>::zeros([batch], &device);

        if height > 1 {
            let diff = input.clone().narrow(2, 1, height - 1) - input.clone().narrow(2, 0, height - 1);
            total = total + diff.abs().flatten::<2>(1, 3).sum_dim(1).squeeze::<1>(1);
        }
        if width > 1 {
            let diff = input.clone().narrow(3, 1, width - 1) - input.narrow(3, 0, width - 1);
            total = total + diff.abs().flatten::<2>(1, 3).sum_dim(1).squeeze::<1>(1);
        }

        total * (self.weight / numel)
    }

    fn name(&self) -> &str {
        "TotalVariation"
    }
}

/// Weighted p-norm of the input, discouraging extreme values.
#[derive(Debug, Clone, Copy)]
pub struct LpNorm {
    weight: f32,
    p: f32,
}

impl LpNorm {
    /// Create a p-norm penalty.
    ///
    /// # Errors
    ///
    /// Returns an error when `p < 1`.
    pub fn new(weight: f32, p: f32) -> Result<Self> {
        if p < 1.0 {
            return Err(VisError::InvalidConfig(format!(
                "p-norm requires p >= 1, got {p}"
            )));
        }
        Ok(Self { weight, p })
    }

    /// L1 penalty.
    #[must_use]
    pub fn l1(weight: f32) -> Self {
        Self { weight, p: 1.0 }
    }

    /// L2 penalty.
    #[must_use]
    pub fn l2(weight: f32) -> Self {
        Self { weight, p: 2.0 }
    }
}

impl<B: Backend> Regularizer<B> for LpNorm {
    fn penalty(&self, input: Tensor<B, 4>) -> Tensor<B, 1> {
        let [_, channels, height, width] = input.dims();
        let numel = (channels * height * width) as f32;

        let summed = input
            .abs()
            .powf_scalar(self.p)
            .flatten::<2>(1, 3)
            .sum_dim(1)
            .squeeze::<1>(1);

        summed.powf_scalar(1.0 / self.p) * (self.weight / numel)
    }

    fn name(&self) -> &str {
        "LpNorm"
    }
}
