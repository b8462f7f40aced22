//! The gradient-ascent driver synthesizing score-maximizing inputs.

use std::marker::PhantomData;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use lens_core::{
    GeneratedInputs, ModifierPipeline, Result as CoreResult, Score, Seed, VisError, VisModel,
};

use crate::callback::{CallbackSet, StepCallback, StepContext};
use crate::error::{MaximError, Result};
use crate::input_modifier::InputModifier;
use crate::optimizer::{InputAdam, InputOptimizer};
use crate::regularizer::Regularizer;

/// Configuration for [`ActivationMaximization`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaximizeConfig {
    /// Number of ascent steps. Zero returns the seed unchanged.
    pub steps: usize,
    /// Seed for random initialization in
    /// [`ActivationMaximization::maximize_from_shape`].
    pub seed: Option<Seed>,
}

impl Default for MaximizeConfig {
    fn default() -> Self {
        Self {
            steps: 200,
            seed: None,
        }
    }
}

impl MaximizeConfig {
    /// Create a configuration with the given step count.
    #[must_use]
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Set the initialization seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Iterative gradient ascent on the model input.
///
/// Each step applies the input modifiers inside the differentiation scope,
/// evaluates the score on the modified input, subtracts the weighted
/// regularizer penalties, backpropagates, and lets the optimizer update the
/// raw input. Callbacks observe every step and may stop the run early.
///
/// Gradient semantics: modifiers and regularizer penalties are part of the
/// differentiated objective (`score - Σ penalty`); there is no separate
/// post-hoc gradient adjustment path.
///
/// The model's weights are never touched; the only mutated state is the
/// input tensor and the optimizer's moments.
///
/// # Example
///
/// ```rust,ignore
/// use lens_maxim::{ActivationMaximization, Jitter, MaximizeConfig, TotalVariation};
///
/// let mut maximizer = ActivationMaximization::new(model)
///     .with_regularizer(TotalVariation::new(0.5))
///     .with_input_modifier(Jitter::new(4))
///     .with_callback(ProgressCallback::default());
///
/// let images = maximizer.maximize(&score, seed_input, &MaximizeConfig::new(256))?;
/// ```
pub struct ActivationMaximization<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    model: M,
    optimizer: Box<dyn InputOptimizer<B::InnerBackend>>,
    regularizers: Vec<Box<dyn Regularizer<B>>>,
    modifiers: Vec<Box<dyn InputModifier<B>>>,
    callbacks: CallbackSet,
    _backend: PhantomData<B>,
}

impl<B, M> ActivationMaximization<B, M>
where
    B: AutodiffBackend,
    M: VisModel<B>,
{
    /// Create a maximizer with the default Adam ascent optimizer.
    pub fn new(model: M) -> Self {
        Self {
            model,
            optimizer: Box::new(InputAdam::default()),
            regularizers: Vec::new(),
            modifiers: Vec::new(),
            callbacks: CallbackSet::new(),
            _backend: PhantomData,
        }
    }

    /// Create a maximizer after running the model through a modifier
    /// pipeline.
    pub fn from_modified(model: M, modifiers: &ModifierPipeline<B, M>) -> CoreResult<Self> {
        Ok(Self::new(modifiers.apply(model)?))
    }

    /// Replace the input optimizer.
    #[must_use]
    pub fn with_optimizer<O: InputOptimizer<B::InnerBackend> + 'static>(
        mut self,
        optimizer: O,
    ) -> Self {
        self.optimizer = Box::new(optimizer);
        self
    }

    /// Add a regularizer; penalties accumulate in registration order.
    #[must_use]
    pub fn with_regularizer<R: Regularizer<B> + 'static>(mut self, regularizer: R) -> Self {
        self.regularizers.push(Box::new(regularizer));
        self
    }

    /// Add an input modifier; modifiers apply in registration order.
    #[must_use]
    pub fn with_input_modifier<T: InputModifier<B> + 'static>(mut self, modifier: T) -> Self {
        self.modifiers.push(Box::new(modifier));
        self
    }

    /// Add a per-step callback.
    #[must_use]
    pub fn with_callback<C: StepCallback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.add(callback);
        self
    }

    /// Maximize `score` starting from a random seed of the given shape.
    ///
    /// The seed is drawn from a standard normal distribution, reproducibly
    /// when [`MaximizeConfig::seed`] is set.
    pub fn maximize_from_shape(
        &mut self,
        score: &dyn Score<B>,
        shape: [usize; 4],
        device: &B::Device,
        config: &MaximizeConfig,
    ) -> Result<GeneratedInputs<B::InnerBackend>> {
        if let Some(seed) = config.seed {
            B::seed(seed.derive("init").value());
        }
        let seed_input = Tensor::<B, 4>::random(
            shape,
            burn::tensor::Distribution::Normal(0.0, 1.0),
            device,
        );
        self.maximize(score, seed_input, config)
    }

    /// Maximize `score` starting from `seed_input`.
    ///
    /// # Errors
    ///
    /// Fails when the score output does not match the batch, when the seed
    /// is disconnected from the score, or when a callback fails. Numerical
    /// degeneracies (flat gradients, NaN scores) are surfaced in the result
    /// rather than corrected.
    pub fn maximize(
        &mut self,
        score: &dyn Score<B>,
        seed_input: Tensor<B, 4>,
        config: &MaximizeConfig,
    ) -> Result<GeneratedInputs<B::InnerBackend>> {
        let [batch, _, _, _] = seed_input.dims();

        self.optimizer.reset();
        self.callbacks.on_begin(config.steps)?;
        tracing::debug!(
            steps = config.steps,
            regularizers = self.regularizers.len(),
            modifiers = self.modifiers.len(),
            "starting activation maximization"
        );

        let mut current = seed_input.inner();

        for step in 0..config.steps {
            let leaf = Tensor::<B, 4>::from_inner(current.clone()).require_grad();

            let mut modified = leaf.clone();
            for modifier in &mut self.modifiers {
                modified = modifier.apply(modified).map_err(MaximError::from)?;
            }

            let output = self
                .model
                .output_activation()
                .apply(self.model.forward(modified));
            let values = score.evaluate(output).map_err(MaximError::from)?;
            if values.dims()[0] != batch {
                return Err(MaximError::Core(VisError::ShapeMismatch(format!(
                    "score produced {} values for a batch of {batch} samples",
                    values.dims()[0]
                ))));
            }

            let mut objective = values.clone();
            for regularizer in &self.regularizers {
                objective = objective - regularizer.penalty(leaf.clone());
            }

            let grads = objective.sum().backward();
            let gradient = leaf
                .grad(&grads)
                .ok_or_else(|| VisError::MissingGradient("seed input".to_string()))
                .map_err(MaximError::from)?;

            current = self.optimizer.step(current, gradient);

            let scores: Vec<f32> = values
                .inner()
                .into_data()
                .to_vec()
                .map_err(|e| MaximError::Other(format!("score conversion failed: {e:?}")))?;
            let mut ctx = StepContext::new(step, config.steps, scores);
            self.callbacks.on_step(&mut ctx)?;
            if ctx.stop {
                tracing::info!("maximization stopped early at step {}", step + 1);
                break;
            }
        }

        self.callbacks.on_end()?;
        Ok(GeneratedInputs::new(current))
    }
}
