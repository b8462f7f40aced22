//! Ascent update rules applied to the optimized input.
//!
//! Unlike a training optimizer, these update a single dense tensor (the
//! synthesized input) and ascend the objective rather than descending a
//! loss. State lives on the backend as tensors and is reset per run.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// An update rule for gradient ascent on the input tensor.
pub trait InputOptimizer<B: Backend>: Send {
    /// Apply one ascent update, returning the new input.
    fn step(&mut self, input: Tensor<B, 4>, gradient: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Reset internal state between runs.
    fn reset(&mut self);

    /// Get the optimizer name for logging/debugging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Configuration for [`InputAdam`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAdamConfig {
    /// Learning rate.
    pub lr: f64,
    /// First moment decay (beta1).
    pub beta1: f64,
    /// Second moment decay (beta2).
    pub beta2: f64,
    /// Small epsilon for numerical stability.
    pub epsilon: f64,
}

impl Default for InputAdamConfig {
    fn default() -> Self {
        Self {
            lr: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl InputAdamConfig {
    /// Create a new configuration with the given learning rate.
    pub fn new(lr: f64) -> Self {
        Self {
            lr,
            ..Default::default()
        }
    }

    /// Set beta1 (first moment decay).
    #[must_use]
    pub fn with_beta1(mut self, beta1: f64) -> Self {
        self.beta1 = beta1;
        self
    }

    /// Set beta2 (second moment decay).
    #[must_use]
    pub fn with_beta2(mut self, beta2: f64) -> Self {
        self.beta2 = beta2;
        self
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Initialize the optimizer.
    pub fn init<B: Backend>(&self) -> InputAdam<B> {
        InputAdam::new(self.clone())
    }
}

/// Adam ascent on the input tensor.
///
/// Standard bias-corrected Adam moments; the update is added to the input
/// since the objective is maximized.
pub struct InputAdam<B: Backend> {
    config: InputAdamConfig,
    step: usize,
    moment1: Option<Tensor<B, 4>>,
    moment2: Option<Tensor<B, 4>>,
}

impl<B: Backend> InputAdam<B> {
    /// Create a new Adam ascent optimizer.
    pub fn new(config: InputAdamConfig) -> Self {
        Self {
            config,
            step: 0,
            moment1: None,
            moment2: None,
        }
    }

    /// Get the current learning rate.
    pub fn lr(&self) -> f64 {
        self.config.lr
    }

    /// Get the current step count.
    pub fn step_count(&self) -> usize {
        self.step
    }
}

impl<B: Backend> Default for InputAdam<B> {
    fn default() -> Self {
        Self::new(InputAdamConfig::default())
    }
}

impl<B: Backend> InputOptimizer<B> for InputAdam<B> {
    fn step(&mut self, input: Tensor<B, 4>, gradient: Tensor<B, 4>) -> Tensor<B, 4> {
        self.step += 1;
        let t = self.step as i32;

        let beta1 = self.config.beta1 as f32;
        let beta2 = self.config.beta2 as f32;
        let lr = self.config.lr as f32;
        let epsilon = self.config.epsilon as f32;

        let moment1 = match self.moment1.take() {
            Some(m) => m * beta1 + gradient.clone() * (1.0 - beta1),
            None => gradient.clone() * (1.0 - beta1),
        };
        let moment2 = match self.moment2.take() {
            Some(v) => v * beta2 + gradient.clone() * gradient * (1.0 - beta2),
            None => gradient.clone() * gradient * (1.0 - beta2),
        };

        self.moment1 = Some(moment1.clone());
        self.moment2 = Some(moment2.clone());

        let m_hat = moment1 / (1.0 - beta1.powi(t));
        let v_hat = moment2 / (1.0 - beta2.powi(t));

        input + m_hat / (v_hat.sqrt() + epsilon) * lr
    }

    fn reset(&mut self) {
        self.step = 0;
        self.moment1 = None;
        self.moment2 = None;
    }

    fn name(&self) -> &str {
        "InputAdam"
    }
}

/// Plain gradient ascent: `input + lr * gradient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientAscent {
    /// Learning rate.
    pub lr: f64,
}

impl GradientAscent {
    /// Create a new plain ascent rule with the given learning rate.
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Default for GradientAscent {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl<B: Backend> InputOptimizer<B> for GradientAscent {
    fn step(&mut self, input: Tensor<B, 4>, gradient: Tensor<B, 4>) -> Tensor<B, 4> {
        input + gradient * self.lr as f32
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "GradientAscent"
    }
}
