//! Cadence decisions for step- and epoch-driven side effects.
//!
//! Logging, sampling and validation fire on the global step counter;
//! checkpointing fires once per completed epoch. All functions here are pure.

use serde::{Deserialize, Serialize};

/// Frequencies for every cadence-driven action.
///
/// A frequency of `0` disables the action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Emit a training log record every N global steps
    pub log_every: u64,
    /// Persist a target/output sample grid every N global steps
    pub sample_every: u64,
    /// Run the validation loop every N global steps
    pub val_every: u64,
    /// Save a checkpoint every N epochs
    pub ckpt_every: u64,
    /// First epoch eligible for checkpointing
    pub ckpt_start_epoch: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            log_every: 100,
            sample_every: 500,
            val_every: 1000,
            ckpt_every: 25,
            ckpt_start_epoch: 0,
        }
    }
}

impl CadenceConfig {
    /// Actions due after `global_step` has been processed.
    pub fn due(&self, global_step: u64, epoch: u64) -> DueActions {
        due(global_step, epoch, self)
    }

    /// Whether a checkpoint is due at the end of `epoch`.
    pub fn checkpoint_due(&self, epoch: u64) -> bool {
        checkpoint_due(epoch, self)
    }
}

/// Step-driven actions due for one processed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DueActions {
    pub log: bool,
    pub sample: bool,
    pub validate: bool,
}

impl DueActions {
    pub fn any(&self) -> bool {
        self.log || self.sample || self.validate
    }
}

fn fires(counter: u64, every: u64) -> bool {
    every > 0 && counter.is_multiple_of(every)
}

/// Decide the step-driven actions for `global_step`.
///
/// `epoch` does not influence the result; it is accepted so every cadence
/// query carries the same counters.
pub fn due(global_step: u64, _epoch: u64, cfg: &CadenceConfig) -> DueActions {
    DueActions {
        log: fires(global_step, cfg.log_every),
        sample: fires(global_step, cfg.sample_every),
        validate: fires(global_step, cfg.val_every),
    }
}

/// Decide whether the just-completed `epoch` gets a checkpoint.
///
/// `ckpt_every == 0` disables checkpointing entirely.
pub fn checkpoint_due(epoch: u64, cfg: &CadenceConfig) -> bool {
    epoch >= cfg.ckpt_start_epoch && fires(epoch, cfg.ckpt_every)
}
