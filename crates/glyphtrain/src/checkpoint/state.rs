//! Checkpoint state and trait definitions.

use crate::model::{GlyphModel, ParamStore};
use crate::training::TrainingProgress;
use crate::Result;
use ndarray::ArrayD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trait for components that can be checkpointed.
///
/// `load_state(save_state())` must leave the component in a state whose
/// subsequent behaviour is identical to the component it was saved from.
pub trait Checkpointable {
    type State: Serialize + DeserializeOwned;

    /// Snapshot the component's state.
    fn save_state(&self) -> Self::State;

    /// Restore the component's state from a snapshot.
    fn load_state(&mut self, state: Self::State) -> Result<()>;
}

/// Complete training snapshot.
///
/// Contains all information needed to resume optimisation exactly where it
/// left off.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointState<O> {
    /// Identifier of the run that wrote the checkpoint
    pub run_id: String,
    /// Epoch that had just completed when the checkpoint was taken
    pub epoch: u64,
    /// Global step (processed batches) at checkpoint time
    pub global_step: u64,
    /// Model parameters by name
    pub model: BTreeMap<String, ArrayD<f64>>,
    /// Optimizer state, including moment buffers and learning rate
    pub optimizer: O,
    /// RFC 3339 creation time
    pub timestamp: String,
    /// glyphtrain version
    pub version: String,
}

impl<O> CheckpointState<O> {
    /// Capture a read-only snapshot of the model, optimizer and counters.
    pub fn capture<M, P>(
        run_id: impl Into<String>,
        progress: TrainingProgress,
        model: &M,
        optimizer: &P,
    ) -> Self
    where
        M: GlyphModel + ?Sized,
        P: Checkpointable<State = O>,
    {
        Self {
            run_id: run_id.into(),
            epoch: progress.epoch,
            global_step: progress.global_step,
            model: model.parameters().save_state(),
            optimizer: optimizer.save_state(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Counters recorded in the snapshot.
    pub fn progress(&self) -> TrainingProgress {
        TrainingProgress {
            epoch: self.epoch,
            global_step: self.global_step,
        }
    }

    /// Load parameters and optimizer state back into live components.
    pub fn restore<M, P>(self, model: &mut M, optimizer: &mut P) -> Result<TrainingProgress>
    where
        M: GlyphModel + ?Sized,
        P: Checkpointable<State = O>,
    {
        let progress = self.progress();
        let params: &mut ParamStore = model.parameters_mut();
        params.load_state(self.model)?;
        optimizer.load_state(self.optimizer)?;
        Ok(progress)
    }
}
