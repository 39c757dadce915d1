//! Durable, append-only log streams.
//!
//! Sinks are opened when a run starts and flushed when dropped, so every
//! exit path (including errors) releases them cleanly.

use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Train log file name inside the logs directory.
pub const TRAIN_LOG: &str = "train_loss_log.txt";
/// Validation log file name inside the logs directory.
pub const VAL_LOG: &str = "val_loss_log.txt";

/// An append-only text file with one record per line.
pub struct LogSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(path = %self.path.display(), "Failed to flush log sink: {}", e);
        }
    }
}

/// The training and validation log streams of one run.
pub struct RunLogs {
    pub train: LogSink,
    pub val: LogSink,
}

impl RunLogs {
    /// Open both streams inside `logs_dir`.
    pub fn open(logs_dir: &Path) -> Result<Self> {
        Ok(Self {
            train: LogSink::open(logs_dir.join(TRAIN_LOG))?,
            val: LogSink::open(logs_dir.join(VAL_LOG))?,
        })
    }

    /// Flush both streams, surfacing write errors.
    pub fn flush(&mut self) -> Result<()> {
        self.train.flush()?;
        self.val.flush()
    }
}
