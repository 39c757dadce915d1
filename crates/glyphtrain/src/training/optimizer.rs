//! Optimizer interface and the AdamW implementation used for glyph training.

use super::config::TrainConfig;
use crate::checkpoint::Checkpointable;
use crate::model::ParamStore;
use crate::{GlyphError, Result};
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trait for back-end agnostic optimizers.
pub trait GlyphOptimizer: Send {
    /// Zero out gradients.
    fn zero_grad(&mut self, params: &mut ParamStore);

    /// Perform an optimization step using the accumulated gradients.
    fn step(&mut self, params: &mut ParamStore) -> Result<()>;

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// AdamW hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 0.0002,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

/// Everything AdamW needs to continue exactly where it stopped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdamWState {
    pub config: AdamWConfig,
    /// Number of update steps taken
    pub step: u64,
    /// First moment estimate per parameter
    pub exp_avg: BTreeMap<String, ArrayD<f64>>,
    /// Second moment estimate per parameter
    pub exp_avg_sq: BTreeMap<String, ArrayD<f64>>,
}

/// Adam with decoupled weight decay.
///
/// Per parameter `p` with gradient `g` at step `t`:
///
/// ```text
/// p *= 1 - lr * weight_decay
/// m = beta1 * m + (1 - beta1) * g
/// v = beta2 * v + (1 - beta2) * g^2
/// p -= lr / (1 - beta1^t) * m / (sqrt(v) / sqrt(1 - beta2^t) + eps)
/// ```
///
/// Parameters without a gradient are left untouched.
#[derive(Clone, Debug, Default)]
pub struct AdamW {
    state: AdamWState,
}

impl AdamW {
    pub fn new(config: AdamWConfig) -> Self {
        Self {
            state: AdamWState {
                config,
                ..Default::default()
            },
        }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        Self::new(AdamWConfig {
            lr: config.lr,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.eps,
            weight_decay: config.weight_decay,
        })
    }

    pub fn config(&self) -> &AdamWConfig {
        &self.state.config
    }

    /// Number of update steps taken so far.
    pub fn steps(&self) -> u64 {
        self.state.step
    }
}

/// `1 - beta^step`, exact for every step count.
fn bias_correction(beta: f64, step: u64) -> f64 {
    match i32::try_from(step) {
        Ok(t) => 1.0 - beta.powi(t),
        Err(_) => 1.0 - beta.powf(step as f64),
    }
}

impl GlyphOptimizer for AdamW {
    fn zero_grad(&mut self, params: &mut ParamStore) {
        params.zero_grad();
    }

    fn step(&mut self, params: &mut ParamStore) -> Result<()> {
        let AdamWConfig {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.state.config;

        self.state.step += 1;
        let bias_correction1 = bias_correction(beta1, self.state.step);
        let bias_correction2_sqrt = bias_correction(beta2, self.state.step).sqrt();
        let step_size = lr / bias_correction1;

        for (name, value, grad) in params.entries_mut() {
            let Some(grad) = grad else { continue };

            let m = self
                .state
                .exp_avg
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(value.raw_dim()));
            let v = self
                .state
                .exp_avg_sq
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(value.raw_dim()));
            if m.shape() != value.shape() || v.shape() != value.shape() {
                return Err(GlyphError::ShapeMismatch {
                    name: name.clone(),
                    expected: value.shape().to_vec(),
                    actual: m.shape().to_vec(),
                });
            }

            if weight_decay != 0.0 {
                value.mapv_inplace(|p| p * (1.0 - lr * weight_decay));
            }
            Zip::from(&mut *m)
                .and(&mut *v)
                .and(grad)
                .for_each(|m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                });
            Zip::from(value).and(&*m).and(&*v).for_each(|p, &m, &v| {
                let denom = v.sqrt() / bias_correction2_sqrt + eps;
                *p -= step_size * m / denom;
            });
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.state.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.state.config.lr = lr;
    }
}

impl Checkpointable for AdamW {
    type State = AdamWState;

    fn save_state(&self) -> Self::State {
        self.state.clone()
    }

    /// Replaces hyperparameters (including the decayed learning rate), the
    /// step count and moment buffers.
    fn load_state(&mut self, state: Self::State) -> Result<()> {
        if state.exp_avg.len() != state.exp_avg_sq.len() {
            return Err(GlyphError::Checkpoint(
                "optimizer moment buffers disagree on parameter count".into(),
            ));
        }
        self.state = state;
        Ok(())
    }
}
