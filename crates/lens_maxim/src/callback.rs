//! Per-step hooks for the maximization loop.

use crate::error::Result;

/// State handed to callbacks once per optimization step.
pub struct StepContext {
    /// Current step (0-indexed).
    pub step: usize,
    /// Total number of steps.
    pub n_steps: usize,
    /// Current per-sample score values.
    pub scores: Vec<f32>,
    /// Set to true to stop the run after this step.
    pub stop: bool,
}

impl StepContext {
    /// Create a new step context.
    pub fn new(step: usize, n_steps: usize, scores: Vec<f32>) -> Self {
        Self {
            step,
            n_steps,
            scores,
            stop: false,
        }
    }

    /// Mean score across the batch.
    #[must_use]
    pub fn mean_score(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }

    /// Progress as a fraction (0.0 to 1.0).
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.n_steps == 0 {
            return 1.0;
        }
        (self.step + 1) as f32 / self.n_steps as f32
    }
}

/// Trait for maximization callbacks.
///
/// Callbacks observe the loop once per step and may request an early stop
/// through [`StepContext::stop`].
pub trait StepCallback: Send {
    /// Called before the first step.
    fn on_begin(&mut self, _n_steps: usize) -> Result<()> {
        Ok(())
    }

    /// Called after each step.
    fn on_step(&mut self, _ctx: &mut StepContext) -> Result<()> {
        Ok(())
    }

    /// Called after the last step (or after an early stop).
    fn on_end(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the callback name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A list of callbacks invoked in registration order.
#[derive(Default)]
pub struct CallbackSet {
    callbacks: Vec<Box<dyn StepCallback>>,
}

impl CallbackSet {
    /// Create a new empty callback set.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback.
    pub fn add<C: StepCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Call on_begin on all callbacks.
    pub fn on_begin(&mut self, n_steps: usize) -> Result<()> {
        for cb in &mut self.callbacks {
            cb.on_begin(n_steps)?;
        }
        Ok(())
    }

    /// Call on_step on all callbacks.
    pub fn on_step(&mut self, ctx: &mut StepContext) -> Result<()> {
        for cb in &mut self.callbacks {
            cb.on_step(ctx)?;
        }
        Ok(())
    }

    /// Call on_end on all callbacks.
    pub fn on_end(&mut self) -> Result<()> {
        for cb in &mut self.callbacks {
            cb.on_end()?;
        }
        Ok(())
    }
}

/// Logs the mean score every `every` steps.
pub struct ProgressCallback {
    every: usize,
}

impl ProgressCallback {
    /// Create a progress callback logging every `every` steps.
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for ProgressCallback {
    fn default() -> Self {
        Self::new(10)
    }
}

impl StepCallback for ProgressCallback {
    fn on_begin(&mut self, n_steps: usize) -> Result<()> {
        tracing::info!("Starting maximization for {} steps", n_steps);
        Ok(())
    }

    fn on_step(&mut self, ctx: &mut StepContext) -> Result<()> {
        if (ctx.step + 1) % self.every == 0 || ctx.step + 1 == ctx.n_steps {
            tracing::info!(
                "Step {}/{}: mean_score={:.4}",
                ctx.step + 1,
                ctx.n_steps,
                ctx.mean_score()
            );
        }
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        tracing::info!("Maximization completed");
        Ok(())
    }

    fn name(&self) -> &str {
        "ProgressCallback"
    }
}

/// Records per-step score vectors for later inspection.
#[derive(Default)]
pub struct HistoryCallback {
    history: Vec<Vec<f32>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded per-step score vectors.
    #[must_use]
    pub fn history(&self) -> &[Vec<f32>] {
        &self.history
    }

    /// The step with the best mean score, if any steps ran.
    #[must_use]
    pub fn best_step(&self) -> Option<usize> {
        self.history
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let mean_a = a.iter().sum::<f32>() / a.len().max(1) as f32;
                let mean_b = b.iter().sum::<f32>() / b.len().max(1) as f32;
                mean_a.partial_cmp(&mean_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }
}

impl StepCallback for HistoryCallback {
    fn on_begin(&mut self, _n_steps: usize) -> Result<()> {
        self.history.clear();
        Ok(())
    }

    fn on_step(&mut self, ctx: &mut StepContext) -> Result<()> {
        self.history.push(ctx.scores.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "HistoryCallback"
    }
}

/// Stops early when the mean score stops improving.
pub struct PlateauStopping {
    patience: usize,
    min_delta: f32,
    best: f32,
    counter: usize,
}

impl PlateauStopping {
    /// Create a plateau-stopping callback.
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best: f32::NEG_INFINITY,
            counter: 0,
        }
    }
}

impl StepCallback for PlateauStopping {
    fn on_begin(&mut self, _n_steps: usize) -> Result<()> {
        self.best = f32::NEG_INFINITY;
        self.counter = 0;
        Ok(())
    }

    fn on_step(&mut self, ctx: &mut StepContext) -> Result<()> {
        let current = ctx.mean_score();

        if current > self.best + self.min_delta {
            self.best = current;
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter >= self.patience {
                tracing::info!(
                    "Stopping early after {} steps without improvement",
                    self.patience
                );
                ctx.stop = true;
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "PlateauStopping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_context() {
        let ctx = StepContext::new(4, 10, vec![1.0, 3.0]);
        assert!((ctx.mean_score() - 2.0).abs() < 1e-6);
        assert!((ctx.progress() - 0.5).abs() < 1e-6);
        assert!(!ctx.stop);
    }

    #[test]
    fn test_history_callback_records_steps() {
        let mut history = HistoryCallback::new();
        history.on_begin(3).unwrap();

        for step in 0..3 {
            let mut ctx = StepContext::new(step, 3, vec![step as f32]);
            history.on_step(&mut ctx).unwrap();
        }

        assert_eq!(history.history().len(), 3);
        assert_eq!(history.best_step(), Some(2));
    }

    #[test]
    fn test_plateau_stopping_triggers() {
        let mut stopping = PlateauStopping::new(2, 0.0);
        stopping.on_begin(10).unwrap();

        let mut stopped_at = None;
        for step in 0..10 {
            // Constant score: no improvement after the first step.
            let mut ctx = StepContext::new(step, 10, vec![1.0]);
            stopping.on_step(&mut ctx).unwrap();
            if ctx.stop {
                stopped_at = Some(step);
                break;
            }
        }

        assert_eq!(stopped_at, Some(2));
    }

    #[test]
    fn test_plateau_stopping_resets_on_improvement() {
        let mut stopping = PlateauStopping::new(2, 0.0);
        stopping.on_begin(10).unwrap();

        for step in 0..6 {
            // Strictly improving score never stops.
            let mut ctx = StepContext::new(step, 10, vec![step as f32]);
            stopping.on_step(&mut ctx).unwrap();
            assert!(!ctx.stop);
        }
    }

    #[test]
    fn test_callback_set_fans_out() {
        let mut set = CallbackSet::new();
        set.add(ProgressCallback::new(5));
        set.add(HistoryCallback::new());

        set.on_begin(2).unwrap();
        let mut ctx = StepContext::new(0, 2, vec![0.5]);
        set.on_step(&mut ctx).unwrap();
        set.on_end().unwrap();
    }
}
