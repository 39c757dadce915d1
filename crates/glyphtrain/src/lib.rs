//! # glyphtrain
//!
//! Training orchestration for a generative model that jointly produces a raster
//! glyph image and a vector drawing-command sequence for the same character.
//!
//! ## Overview
//!
//! glyphtrain provides:
//! - `CadenceScheduler` functions deciding when to log, sample, validate and checkpoint
//! - `LossAggregator` combining a structured loss breakdown into one scalar target
//! - `ValidationRunner` averaging losses over a held-out stream without touching training state
//! - `CheckpointManager` for durable `(epoch, global_step)`-keyed snapshots
//! - `Trainer`, the epoch/batch state machine tying everything together
//!
//! The model, the batch loader and the experiment tracker are collaborators
//! consumed through the traits in [`model`], [`data`] and [`log`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use glyphtrain::prelude::*;
//!
//! let config = TrainConfig::default().with_epochs(0, 10);
//! let layout = ExperimentLayout::from_config(&config);
//! layout.ensure_dirs()?;
//! layout.write_manifest(&config, &glyphtrain::training::new_run_id())?;
//!
//! let optimizer = AdamW::from_config(&config);
//! let mut trainer = Trainer::new(config, layout, model, optimizer, Box::new(ConsoleLogger::new()))?;
//! let summary = trainer.train(&train_loader, &val_loader)?;
//! ```

use std::path::PathBuf;

pub mod cadence;
pub mod checkpoint;
pub mod data;
pub mod log;
pub mod loss;
pub mod model;
pub mod sample;
pub mod training;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cadence::{checkpoint_due, due, CadenceConfig, DueActions};
    pub use crate::checkpoint::{CheckpointKey, CheckpointManager, CheckpointState, Checkpointable};
    pub use crate::data::{Batch, GlyphLoader, VecLoader};
    pub use crate::log::{
        CompositeLogger, ConsoleLogger, JsonlTracker, LogSink, MetricLogger, NoOpLogger, RunLogs,
    };
    pub use crate::loss::{
        AggregatedLoss, ImageLosses, LossAggregator, LossBreakdown, LossWeights, Objective,
        SequenceLosses, WeightedTerms,
    };
    pub use crate::model::{EvalGuard, ForwardOutput, GlyphModel, ImagePair, ParamStore, Phase};
    pub use crate::sample::SampleWriter;
    pub use crate::training::{
        AdamW, ExperimentLayout, ExponentialDecay, GlyphOptimizer, ResumeEpoch, TrainConfig,
        TrainSummary, Trainer, TrainingMode, TrainingProgress,
    };
    pub use crate::validation::{ValidationReport, ValidationRunner};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fatal configuration problems, raised before or at the point of use.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported training mode '{0}' (expected 'main_model')")]
    UnsupportedMode(String),

    #[error("validation stream produced no batches")]
    EmptyValidationStream,

    #[error("training stream produced no batches")]
    EmptyTrainingStream,

    #[error("checkpoint file not found: {}", .0.display())]
    MissingCheckpoint(PathBuf),

    #[error("checkpoint is missing required key '{0}'")]
    MissingCheckpointKey(String),

    #[error("resume requested but no checkpoint path was configured")]
    MissingResumePath,

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// A loss breakdown that does not satisfy the model contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("loss breakdown is missing category '{0}'")]
    MissingCategory(String),

    #[error("loss category '{category}' is missing term '{term}'")]
    MissingTerm { category: String, term: String },
}

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum GlyphError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

pub type Result<T> = core::result::Result<T, GlyphError>;
