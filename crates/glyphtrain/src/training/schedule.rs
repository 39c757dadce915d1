//! Learning-rate schedules.

use super::optimizer::GlyphOptimizer;

/// Multiply the learning rate by `gamma` every time [`step`](Self::step) is called.
///
/// The trainer calls it once per completed epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialDecay {
    gamma: f64,
    applied: u64,
}

impl ExponentialDecay {
    pub fn new(gamma: f64) -> Self {
        Self { gamma, applied: 0 }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// How many times the decay has been applied.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn step<O: GlyphOptimizer + ?Sized>(&mut self, optimizer: &mut O) {
        let lr = optimizer.learning_rate() * self.gamma;
        optimizer.set_learning_rate(lr);
        self.applied += 1;
        tracing::debug!(lr, applied = self.applied, "Learning rate decayed");
    }
}
