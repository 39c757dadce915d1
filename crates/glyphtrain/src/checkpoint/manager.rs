//! Checkpoint manager: durable `(epoch, global_step)`-keyed snapshots.

use super::state::CheckpointState;
use crate::log::MetricLogger;
use crate::{ConfigError, GlyphError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Artifact name under which checkpoints are published to the tracker.
pub const ARTIFACT_NAME: &str = "model_main_checkpoints";

const EXTENSION: &str = "ckpt";

/// Identity of a checkpoint. Orders by epoch, then global step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckpointKey {
    pub epoch: u64,
    pub global_step: u64,
}

impl CheckpointKey {
    pub fn new(epoch: u64, global_step: u64) -> Self {
        Self { epoch, global_step }
    }

    /// `<epoch>_<global_step>.ckpt`
    pub fn file_name(&self) -> String {
        format!("{self}.{EXTENSION}")
    }

    /// Parse the key out of a checkpoint file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.epoch, self.global_step)
    }
}

impl FromStr for CheckpointKey {
    type Err = GlyphError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GlyphError::Checkpoint(format!("invalid checkpoint key '{s}'"));
        let (epoch, step) = s.split_once('_').ok_or_else(invalid)?;
        Ok(Self {
            epoch: epoch.parse().map_err(|_| invalid())?,
            global_step: step.parse().map_err(|_| invalid())?,
        })
    }
}

/// Manages checkpoint files in one directory.
///
/// Written checkpoints are never modified, and superseded ones are kept.
///
/// # Example
///
/// ```ignore
/// let manager = CheckpointManager::new(layout.checkpoints_dir())?;
/// let path = manager.save(&CheckpointState::capture(run_id, progress, &model, &optimizer))?;
/// if let Err(e) = manager.publish(&path, tracker.as_ref()) {
///     tracing::warn!("artifact publication failed: {e}");
/// }
///
/// // To resume:
/// let state: CheckpointState<AdamWState> = CheckpointManager::load(&path)?;
/// let progress = state.restore(&mut model, &mut optimizer)?;
/// ```
#[derive(Clone, Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager, creating the checkpoint directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Get the checkpoint directory path.
    pub fn checkpoint_dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: CheckpointKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Durably write a snapshot under its `(epoch, global_step)` key.
    ///
    /// The file is written to a temporary name and renamed into place. An
    /// existing checkpoint with the same key is an error.
    pub fn save<O: Serialize>(&self, state: &CheckpointState<O>) -> Result<PathBuf> {
        let key = CheckpointKey::new(state.epoch, state.global_step);
        let path = self.path_for(key);
        if path.exists() {
            return Err(GlyphError::Checkpoint(format!(
                "checkpoint {} already exists",
                path.display()
            )));
        }

        let tmp = self.dir.join(format!(".{}.tmp", key.file_name()));
        {
            let file = fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, state)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::info!(path = %path.display(), epoch = state.epoch, step = state.global_step, "Saved checkpoint");
        Ok(path)
    }

    /// Read a snapshot from `path`.
    pub fn load<O: DeserializeOwned>(path: impl AsRef<Path>) -> Result<CheckpointState<O>> {
        let path = path.as_ref();
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingCheckpoint(path.to_path_buf()).into());
            }
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_reader(BufReader::new(file)).map_err(classify_load_error)?;
        tracing::info!(path = %path.display(), "Loaded checkpoint");
        Ok(state)
    }

    /// Read the snapshot stored under `key`.
    pub fn load_key<O: DeserializeOwned>(&self, key: CheckpointKey) -> Result<CheckpointState<O>> {
        Self::load(self.path_for(key))
    }

    /// Path of the checkpoint stored under `key`, if present.
    pub fn find(&self, key: CheckpointKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }

    /// List all checkpoints ordered by `(epoch, global_step)`.
    pub fn list(&self) -> Result<Vec<(CheckpointKey, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Ok(Vec::new()),
        };

        let mut checkpoints: Vec<(CheckpointKey, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|p| CheckpointKey::from_path(&p).map(|k| (k, p)))
            .collect();

        checkpoints.sort_by_key(|(k, _)| *k);
        Ok(checkpoints)
    }

    /// The most recent checkpoint, if any.
    pub fn latest(&self) -> Result<Option<(CheckpointKey, PathBuf)>> {
        Ok(self.list()?.pop())
    }

    /// Publish a written checkpoint to the tracker.
    ///
    /// Independent of [`save`](Self::save): callers treat a failure here as
    /// non-fatal.
    pub fn publish(&self, path: &Path, tracker: &dyn MetricLogger) -> Result<()> {
        tracker.publish_artifact(ARTIFACT_NAME, "model", path)
    }
}

/// Map a missing-field decode error onto the configuration taxonomy.
fn classify_load_error(e: serde_json::Error) -> GlyphError {
    let msg = e.to_string();
    if let Some(rest) = msg.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return ConfigError::MissingCheckpointKey(field.to_string()).into();
        }
    }
    e.into()
}
