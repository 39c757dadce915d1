//! Checkpointing for resumable training.
//!
//! Provides:
//! - `Checkpointable` trait for components with serialisable state
//! - `CheckpointState` snapshot of parameters, optimizer state and counters
//! - `CheckpointKey` identity `(epoch, global_step)`
//! - `CheckpointManager` for durable writes, lookup and best-effort publication

mod manager;
mod state;

pub use manager::{CheckpointKey, CheckpointManager, ARTIFACT_NAME};
pub use state::{CheckpointState, Checkpointable};
