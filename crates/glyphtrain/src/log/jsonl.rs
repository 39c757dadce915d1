//! Local file-backed experiment tracker.
//!
//! Layout under the tracker root:
//!
//! ```text
//! events.jsonl                  one JSON event per line
//! media/<name>_<step>.pgm       logged images
//! artifacts/<name>/v<N>/<file>  published artifacts
//! ```

use super::MetricLogger;
use crate::sample::{normalize_to_u8, write_pgm};
use crate::{GlyphError, Result};
use ndarray::ArrayView2;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TrackerEvent<'a> {
    Init {
        project: &'a str,
        run_id: &'a str,
        config: &'a serde_json::Value,
    },
    Scalar {
        name: &'a str,
        value: f64,
        step: u64,
    },
    Metrics {
        step: u64,
        metrics: &'a HashMap<String, f64>,
    },
    Image {
        name: &'a str,
        caption: &'a str,
        step: u64,
        file: String,
    },
    Artifact {
        name: &'a str,
        kind: &'a str,
        version: u32,
        file: String,
    },
}

/// Tracker writing JSON-lines events and versioned artifact copies.
pub struct JsonlTracker {
    root: PathBuf,
    writer: Mutex<BufWriter<File>>,
    versions: Mutex<HashMap<String, u32>>,
}

impl JsonlTracker {
    /// Open (or continue) a tracker rooted at `root` and record the run config.
    pub fn new(
        root: impl Into<PathBuf>,
        project: &str,
        run_id: &str,
        config: &serde_json::Value,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("media"))?;
        fs::create_dir_all(root.join("artifacts"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(root.join("events.jsonl"))?;
        let tracker = Self {
            root,
            writer: Mutex::new(BufWriter::new(file)),
            versions: Mutex::new(HashMap::new()),
        };
        tracker.emit(&TrackerEvent::Init {
            project,
            run_id,
            config,
        })?;
        Ok(tracker)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Push buffered events to `events.jsonl`.
    pub fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| GlyphError::Tracker("event writer poisoned".into()))?;
        writer.flush()?;
        Ok(())
    }

    fn emit(&self, event: &TrackerEvent<'_>) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| GlyphError::Tracker("event writer poisoned".into()))?;
        writeln!(writer, "{line}")?;
        Ok(())
    }

    fn emit_or_warn(&self, event: &TrackerEvent<'_>) {
        if let Err(e) = self.emit(event) {
            tracing::warn!("Failed to write tracker event: {}", e);
        }
    }

    fn next_version(&self, name: &str) -> Result<u32> {
        let mut versions = self
            .versions
            .lock()
            .map_err(|_| GlyphError::Tracker("version table poisoned".into()))?;
        let v = versions.entry(name.to_string()).or_insert(0);
        *v += 1;
        Ok(*v)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl MetricLogger for JsonlTracker {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        self.emit_or_warn(&TrackerEvent::Scalar { name, value, step });
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        self.emit_or_warn(&TrackerEvent::Metrics { step, metrics });
    }

    fn log_image(&self, name: &str, image: ArrayView2<'_, f32>, caption: &str, step: u64) {
        let file = format!("{}_{step}.pgm", sanitize(name));
        let path = self.root.join("media").join(&file);
        if let Err(e) = write_pgm(&path, normalize_to_u8(image).view()) {
            tracing::warn!(path = %path.display(), "Failed to write tracker image: {}", e);
            return;
        }
        self.emit_or_warn(&TrackerEvent::Image {
            name,
            caption,
            step,
            file: format!("media/{file}"),
        });
    }

    fn publish_artifact(&self, name: &str, kind: &str, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| GlyphError::Tracker(format!("not a file: {}", path.display())))?;
        let version = self.next_version(name)?;
        let dir = self
            .root
            .join("artifacts")
            .join(sanitize(name))
            .join(format!("v{version}"));
        fs::create_dir_all(&dir)?;
        fs::copy(path, dir.join(file_name))?;

        self.emit(&TrackerEvent::Artifact {
            name,
            kind,
            version,
            file: file_name.to_string_lossy().into_owned(),
        })?;
        tracing::info!(name, version, "Published artifact");
        Ok(())
    }

    fn close(&self) {
        if let Err(e) = self.flush() {
            tracing::warn!(root = %self.root.display(), "Failed to flush tracker events: {}", e);
        }
    }
}

impl Drop for JsonlTracker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn read_events(root: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(root.join("events.jsonl"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_events_are_json_lines() {
        let dir = tempdir().unwrap();
        let config = serde_json::json!({"lr": 0.0002});
        let tracker = JsonlTracker::new(dir.path(), "glyphs", "run-1", &config).unwrap();

        tracker.log_scalar("Loss/img_l1", 0.5, 10);
        let mut m = HashMap::new();
        m.insert("VAL/loss_img_l1".to_string(), 0.25);
        tracker.log_metrics(&m, 20);
        tracker.log_image("Images/trg_img", Array2::<f32>::eye(4).view(), "Target", 10);
        tracker.close();

        let events = read_events(dir.path());
        assert_eq!(events.len(), 4);
        assert_eq!(events[0]["event"], "init");
        assert_eq!(events[0]["config"]["lr"], 0.0002);
        assert_eq!(events[1]["event"], "scalar");
        assert_eq!(events[1]["step"], 10);
        assert_eq!(events[2]["metrics"]["VAL/loss_img_l1"], 0.25);
        assert_eq!(events[3]["file"], "media/Images_trg_img_10.pgm");
        assert!(dir.path().join("media/Images_trg_img_10.pgm").exists());
    }

    #[test]
    fn test_flush_surfaces_buffered_events() {
        let dir = tempdir().unwrap();
        let tracker = JsonlTracker::new(dir.path(), "glyphs", "run-2", &serde_json::Value::Null).unwrap();
        tracker.log_scalar("lr", 0.0002, 1);

        tracker.flush().unwrap();
        let events = read_events(dir.path());
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["name"], "lr");
    }

    #[test]
    fn test_poisoned_writer_fails_flush() {
        let dir = tempdir().unwrap();
        let tracker = JsonlTracker::new(dir.path(), "glyphs", "run-3", &serde_json::Value::Null).unwrap();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracker.writer.lock().unwrap();
            panic!("poison");
        }));

        assert!(matches!(tracker.flush(), Err(GlyphError::Tracker(_))));
        // close reports instead of failing
        tracker.close();
    }

    #[test]
    fn test_artifacts_are_versioned() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("3_30.ckpt");
        fs::write(&src, b"{}").unwrap();
        let root = dir.path().join("tracker");
        let tracker = JsonlTracker::new(&root, "p", "r", &serde_json::Value::Null).unwrap();

        tracker.publish_artifact("model_main_checkpoints", "model", &src).unwrap();
        tracker.publish_artifact("model_main_checkpoints", "model", &src).unwrap();

        assert!(root.join("artifacts/model_main_checkpoints/v1/3_30.ckpt").exists());
        assert!(root.join("artifacts/model_main_checkpoints/v2/3_30.ckpt").exists());

        let missing = dir.path().join("nope.ckpt");
        assert!(tracker.publish_artifact("model_main_checkpoints", "model", &missing).is_err());
    }
}
