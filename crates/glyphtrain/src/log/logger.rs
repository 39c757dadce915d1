//! Metric logger traits and composites.

use crate::Result;
use ndarray::ArrayView2;
use std::collections::HashMap;
use std::path::Path;

/// Trait for logging metrics to various tracker backends.
pub trait MetricLogger: Send + Sync {
    /// Log a scalar value (e.g. a loss term).
    fn log_scalar(&self, name: &str, value: f64, step: u64);

    /// Log a set of metrics collected in a map.
    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64);

    /// Log a single-channel image.
    fn log_image(&self, _name: &str, _image: ArrayView2<'_, f32>, _caption: &str, _step: u64) {}

    /// Publish a file as a versioned artifact. Best-effort from the caller's view.
    fn publish_artifact(&self, _name: &str, _kind: &str, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Close the logger and flush any pending writes.
    fn close(&self) {}
}

/// A logger that does nothing (default).
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn log_scalar(&self, _name: &str, _value: f64, _step: u64) {}
    fn log_metrics(&self, _metrics: &HashMap<String, f64>, _step: u64) {}
}

/// A composite logger that dispatches to multiple backends.
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }
}

impl MetricLogger for CompositeLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        for logger in &self.loggers {
            logger.log_scalar(name, value, step);
        }
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        for logger in &self.loggers {
            logger.log_metrics(metrics, step);
        }
    }

    fn log_image(&self, name: &str, image: ArrayView2<'_, f32>, caption: &str, step: u64) {
        for logger in &self.loggers {
            logger.log_image(name, image, caption, step);
        }
    }

    /// Publishes to every backend; reports the first failure after trying all.
    fn publish_artifact(&self, name: &str, kind: &str, path: &Path) -> Result<()> {
        let mut first_err = None;
        for logger in &self.loggers {
            if let Err(e) = logger.publish_artifact(name, kind, path) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}
