//! Score functions mapping model outputs to per-sample scalars.

use burn::prelude::*;

use crate::error::{Result, VisError};

/// A score function reducing a model output to one scalar per sample.
///
/// Scores are the target of every visualization: saliency and CAM methods
/// explain the score, activation maximization ascends it. Implementations
/// must be pure and must not retain state between calls.
///
/// # Example
///
/// ```rust,ignore
/// use lens_core::{CategoricalScore, Score};
///
/// // Explain class 281 for every sample in the batch.
/// let score = CategoricalScore::new(vec![281]);
/// let values = score.evaluate(logits)?;
/// ```
pub trait Score<B: Backend>: Send + Sync {
    /// Reduce a `(batch, classes)` output to a `(batch,)` score tensor.
    ///
    /// # Errors
    ///
    /// Returns an error when the output shape is incompatible with the
    /// score (wrong rank, out-of-range class index, target count that is
    /// neither one nor the batch size).
    fn evaluate(&self, output: Tensor<B, 2>) -> Result<Tensor<B, 1>>;

    /// Get the score name for logging/debugging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Broadcast a per-sample target list over the batch.
///
/// A single target applies to every sample; otherwise the list length must
/// equal the batch size.
fn broadcast_targets<T: Clone>(targets: &[T], batch: usize, what: &str) -> Result<Vec<T>> {
    match targets.len() {
        1 => Ok(vec![targets[0].clone(); batch]),
        n if n == batch => Ok(targets.to_vec()),
        n => Err(VisError::InvalidScore(format!(
            "{what} count {n} does not match batch size {batch}"
        ))),
    }
}

/// Selects one class logit/probability per sample.
///
/// The classic target for classification models: the score of sample `i`
/// is `output[i, indices[i]]`. A single index is broadcast over the batch.
#[derive(Debug, Clone)]
pub struct CategoricalScore {
    indices: Vec<usize>,
}

impl CategoricalScore {
    /// Create a new categorical score for the given class indices.
    ///
    /// # Errors
    ///
    /// Returns an error when `indices` is empty.
    pub fn new(indices: Vec<usize>) -> Result<Self> {
        if indices.is_empty() {
            return Err(VisError::InvalidScore(
                "CategoricalScore requires at least one class index".to_string(),
            ));
        }
        Ok(Self { indices })
    }

    /// Create a score targeting a single class for every sample.
    #[must_use]
    pub fn single(index: usize) -> Self {
        Self {
            indices: vec![index],
        }
    }

    /// The configured class indices.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<B: Backend> Score<B> for CategoricalScore {
    fn evaluate(&self, output: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let [batch, classes] = output.dims();
        let indices = broadcast_targets(&self.indices, batch, "class index")?;

        if let Some(&worst) = indices.iter().max() {
            if worst >= classes {
                return Err(VisError::InvalidScore(format!(
                    "class index {worst} out of range for output with {classes} classes"
                )));
            }
        }

        let idx: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
        let idx = Tensor::<B, 1, Int>::from_ints(idx.as_slice(), &output.device())
            .reshape([batch, 1]);

        Ok(output.gather(1, idx).squeeze::<1>(1))
    }

    fn name(&self) -> &str {
        "CategoricalScore"
    }
}

/// Score for binary classifiers with a single output unit.
///
/// For a `(batch, 1)` output, the score of sample `i` is the output value
/// when `targets[i]` is true, and one minus the output value otherwise.
#[derive(Debug, Clone)]
pub struct BinaryScore {
    targets: Vec<bool>,
}

impl BinaryScore {
    /// Create a new binary score for the given target polarities.
    ///
    /// # Errors
    ///
    /// Returns an error when `targets` is empty.
    pub fn new(targets: Vec<bool>) -> Result<Self> {
        if targets.is_empty() {
            return Err(VisError::InvalidScore(
                "BinaryScore requires at least one target value".to_string(),
            ));
        }
        Ok(Self { targets })
    }

    /// Create a score with a single polarity broadcast over the batch.
    #[must_use]
    pub fn single(target: bool) -> Self {
        Self {
            targets: vec![target],
        }
    }
}

impl<B: Backend> Score<B> for BinaryScore {
    fn evaluate(&self, output: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let [batch, units] = output.dims();
        if units != 1 {
            return Err(VisError::InvalidShape {
                expected: format!("({batch}, 1)"),
                got: format!("({batch}, {units})"),
            });
        }
        let targets = broadcast_targets(&self.targets, batch, "target value")?;

        let polarity: Vec<f32> = targets.iter().map(|&t| if t { 1.0 } else { 0.0 }).collect();
        let polarity = Tensor::<B, 1>::from_floats(polarity.as_slice(), &output.device());
        let values = output.squeeze::<1>(1);

        let negated_values = values.clone().neg() + 1.0;
        let negated_polarity = polarity.clone().neg() + 1.0;
        Ok(values * polarity + negated_values * negated_polarity)
    }

    fn name(&self) -> &str {
        "BinaryScore"
    }
}

/// A score that is identically zero.
///
/// Keeps the output connected to the graph but contributes nothing; useful
/// as a placeholder and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InactiveScore;

impl<B: Backend> Score<B> for InactiveScore {
    fn evaluate(&self, output: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        Ok(output.sum_dim(1).squeeze::<1>(1) * 0.0)
    }

    fn name(&self) -> &str {
        "InactiveScore"
    }
}

/// Closure adapter implementing [`Score`].
///
/// ```rust,ignore
/// use lens_core::ScoreFn;
///
/// // Mean logit as the score.
/// let score = ScoreFn::new(|output: Tensor<B, 2>| output.mean_dim(1).squeeze(1));
/// ```
pub struct ScoreFn<F> {
    f: F,
}

impl<F> ScoreFn<F> {
    /// Wrap a closure as a score.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<B, F> Score<B> for ScoreFn<F>
where
    B: Backend,
    F: Fn(Tensor<B, 2>) -> Tensor<B, 1> + Send + Sync,
{
    fn evaluate(&self, output: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        Ok((self.f)(output))
    }

    fn name(&self) -> &str {
        "ScoreFn"
    }
}
