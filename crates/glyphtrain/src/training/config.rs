//! Trainer configuration.

use crate::cadence::CadenceConfig;
use crate::loss::LossWeights;
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported training modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Joint image + vector-sequence model
    #[default]
    MainModel,
}

impl TrainingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainModel => "main_model",
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> core::result::Result<Self, ConfigError> {
        match s {
            "main_model" => Ok(Self::MainModel),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Which counter decides the first epoch of a resumed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeEpoch {
    /// Start at the configured `init_epoch`, whatever the checkpoint says
    #[default]
    Configured,
    /// Start at the epoch after the one recorded in the checkpoint
    Checkpoint,
}

impl FromStr for ResumeEpoch {
    type Err = ConfigError;

    fn from_str(s: &str) -> core::result::Result<Self, ConfigError> {
        match s {
            "configured" => Ok(Self::Configured),
            "checkpoint" => Ok(Self::Checkpoint),
            other => Err(ConfigError::InvalidValue {
                field: "resume_epoch",
                reason: format!("'{other}' is not one of configured, checkpoint"),
            }),
        }
    }
}

/// Configuration for one training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // Experiment
    /// Experiment name; the run directory is `<name_exp>_<mode>`
    pub name_exp: String,
    /// Root under which `experiments/` is created
    pub exp_path: PathBuf,
    pub mode: TrainingMode,
    /// Root of the prepared glyph dataset
    pub data_root: PathBuf,

    // Data
    pub img_size: usize,
    /// Target script / language code
    pub language: String,
    /// Number of characters in the script's char set
    pub char_num: usize,
    pub max_seq_len: usize,
    /// Width of one vector-command row (command one-hot + arguments)
    pub dim_seq: usize,
    pub batch_size: usize,
    pub batch_size_val: usize,

    // Epochs
    pub init_epoch: u64,
    pub n_epochs: u64,

    // Optimization
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    /// Multiplicative learning-rate decay applied once per epoch
    pub lr_decay: f64,

    pub loss: LossWeights,
    pub cadence: CadenceConfig,

    // Device
    /// Replicate the model across all local devices
    pub multi_gpu: bool,

    // Resume
    pub continue_training: bool,
    pub continue_ckpt: Option<PathBuf>,
    pub resume_epoch: ResumeEpoch,

    // Random seed
    pub seed: u64,

    // Tracking
    pub tracker: bool,
    pub tracker_project: String,
    pub progress_bar: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            name_exp: "glyphs".to_string(),
            exp_path: PathBuf::from("."),
            mode: TrainingMode::MainModel,
            data_root: PathBuf::from("data"),

            img_size: 64,
            language: "eng".to_string(),
            char_num: 52,
            max_seq_len: 51,
            dim_seq: 12,
            batch_size: 64,
            batch_size_val: 32,

            init_epoch: 0,
            n_epochs: 800,

            lr: 0.0002,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            lr_decay: 0.997,

            loss: LossWeights::default(),
            cadence: CadenceConfig::default(),

            multi_gpu: false,

            continue_training: false,
            continue_ckpt: None,
            resume_epoch: ResumeEpoch::Configured,

            seed: 42,

            tracker: false,
            tracker_project: "glyph-generation".to_string(),
            progress_bar: false,
        }
    }
}

impl TrainConfig {
    /// Load from a TOML file; missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse a TOML config. An unknown `mode` fails with
    /// [`ConfigError::UnsupportedMode`], as it does on the command line.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;
        if let Some(mode) = table.get("mode").and_then(toml::Value::as_str) {
            mode.parse::<TrainingMode>()?;
        }
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Set the epoch range `[init_epoch, n_epochs)`.
    pub fn with_epochs(mut self, init_epoch: u64, n_epochs: u64) -> Self {
        self.init_epoch = init_epoch;
        self.n_epochs = n_epochs;
        self
    }

    /// Set learning rate
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_cadence(mut self, cadence: CadenceConfig) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_experiment(mut self, exp_path: impl Into<PathBuf>, name_exp: impl Into<String>) -> Self {
        self.exp_path = exp_path.into();
        self.name_exp = name_exp.into();
        self
    }

    /// Resume from `checkpoint`, choosing the start epoch with `policy`.
    pub fn with_resume(mut self, checkpoint: impl Into<PathBuf>, policy: ResumeEpoch) -> Self {
        self.continue_training = true;
        self.continue_ckpt = Some(checkpoint.into());
        self.resume_epoch = policy;
        self
    }

    /// Directory name of this run inside `experiments/`.
    pub fn run_name(&self) -> String {
        format!("{}_{}", self.name_exp, self.mode)
    }

    /// Reject values the trainer cannot run with.
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            })
        };
        if self.batch_size == 0 {
            return invalid("batch_size", "must be positive");
        }
        if self.batch_size_val == 0 {
            return invalid("batch_size_val", "must be positive");
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return invalid("lr", "must be a positive finite number");
        }
        if !(self.lr_decay > 0.0 && self.lr_decay <= 1.0) {
            return invalid("lr_decay", "must be in (0, 1]");
        }
        for (field, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return invalid(field, "must be in [0, 1)");
            }
        }
        if self.eps <= 0.0 {
            return invalid("eps", "must be positive");
        }
        if self.weight_decay < 0.0 {
            return invalid("weight_decay", "must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlyphError;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("main_model".parse::<TrainingMode>().unwrap(), TrainingMode::MainModel);
        assert!(matches!(
            "others".parse::<TrainingMode>(),
            Err(ConfigError::UnsupportedMode(m)) if m == "others"
        ));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let cfg = TrainConfig::from_toml_str(
            r#"
            name_exp = "thai"
            language = "tha"
            n_epochs = 5
            continue_ckpt = "ckpt/4_400.ckpt"
            resume_epoch = "checkpoint"

            [loss]
            kl_beta = 0.5

            [cadence]
            log_every = 1
            ckpt_every = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.run_name(), "thai_main_model");
        assert_eq!(cfg.n_epochs, 5);
        assert_eq!(cfg.loss.kl_beta, 0.5);
        assert_eq!(cfg.loss.loss_w_l1, 1.0);
        assert_eq!(cfg.cadence.log_every, 1);
        assert_eq!(cfg.cadence.val_every, CadenceConfig::default().val_every);
        assert_eq!(cfg.resume_epoch, ResumeEpoch::Checkpoint);
        assert_eq!(cfg.continue_ckpt, Some(PathBuf::from("ckpt/4_400.ckpt")));
    }

    #[test]
    fn test_unknown_mode_in_toml_is_rejected() {
        let err = TrainConfig::from_toml_str(r#"mode = "others""#).unwrap_err();
        assert!(matches!(
            err,
            GlyphError::Config(ConfigError::UnsupportedMode(ref m)) if m == "others"
        ));
        assert_eq!(
            "others".parse::<TrainingMode>().unwrap_err().to_string(),
            err.to_string().trim_start_matches("Configuration error: ")
        );

        let cfg = TrainConfig::from_toml_str(r#"mode = "main_model""#).unwrap();
        assert_eq!(cfg.mode, TrainingMode::MainModel);
        assert!(matches!(
            TrainConfig::from_toml_str("mode = 3"),
            Err(GlyphError::ConfigFile(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(TrainConfig::default().validate().is_ok());
        let bad = TrainConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidValue { field: "batch_size", .. })
        ));
        let bad = TrainConfig::default().with_lr(-1.0);
        assert!(bad.validate().is_err());
        let bad = TrainConfig {
            lr_decay: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
