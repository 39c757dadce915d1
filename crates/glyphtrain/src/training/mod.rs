//! Training system.
//!
//! Provides:
//! - `TrainConfig` - Run options, loadable from TOML
//! - `ExperimentLayout` - Run directories and the options manifest
//! - `GlyphOptimizer` / `AdamW` - Parameter updates
//! - `ExponentialDecay` - Per-epoch learning-rate decay
//! - `Trainer` - Main epoch/batch loop

mod config;
mod layout;
mod optimizer;
mod schedule;
mod trainer;

pub use config::{ResumeEpoch, TrainConfig, TrainingMode};
pub use layout::{manifest_lines, ExperimentLayout, MANIFEST_FILE};
pub use optimizer::{AdamW, AdamWConfig, AdamWState, GlyphOptimizer};
pub use schedule::ExponentialDecay;
pub use trainer::{
    new_run_id, resolve_start_epoch, val_metric_key, TrainSummary, Trainer, TrainingProgress,
};
