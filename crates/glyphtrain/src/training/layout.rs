//! On-disk layout of one experiment run.

use super::config::TrainConfig;
use crate::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the run manifest inside the experiment directory.
pub const MANIFEST_FILE: &str = "opts.txt";

/// `<exp_path>/experiments/<name_exp>_<mode>/` and its subdirectories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExperimentLayout {
    root: PathBuf,
}

impl ExperimentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        Self::new(config.exp_path.join("experiments").join(config.run_name()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.root.join("samples")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tracker_dir(&self) -> PathBuf {
        self.root.join("tracker")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Create every run directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.samples_dir(),
            self.checkpoints_dir(),
            self.results_dir(),
            self.logs_dir(),
            self.tracker_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Dump every option as `key: value`, nested groups as dotted keys.
    pub fn write_manifest(&self, config: &TrainConfig, run_id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.manifest_path();
        let mut file = fs::File::create(&path)?;
        writeln!(file, "run_id: {run_id}")?;
        for line in manifest_lines(config)? {
            writeln!(file, "{line}")?;
        }
        file.sync_all()?;
        tracing::info!(path = %path.display(), "Wrote run manifest");
        Ok(path)
    }
}

/// Flattened `key: value` lines for every option, sorted by key.
pub fn manifest_lines(config: &TrainConfig) -> Result<Vec<String>> {
    let value = serde_json::to_value(config)?;
    let mut lines = Vec::new();
    flatten("", &value, &mut lines);
    Ok(lines)
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, v, out);
            }
        }
        Value::String(s) => out.push(format!("{prefix}: {s}")),
        Value::Null => out.push(format!("{prefix}: None")),
        other => out.push(format!("{prefix}: {other}")),
    }
}
