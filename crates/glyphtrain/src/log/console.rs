//! Console logging backend.

use super::MetricLogger;
use ndarray::ArrayView2;
use std::collections::HashMap;

/// Logger that prints metrics to stdout via tracing.
pub struct ConsoleLogger;

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        tracing::info!("Step {}: {} = {:.4}", step, name, value);
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        // Group output to avoid spamming lines
        let mut sorted: Vec<_> = metrics.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let body = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v:.4}"))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("Step {}: {}", step, body);
    }

    fn log_image(&self, name: &str, image: ArrayView2<'_, f32>, caption: &str, step: u64) {
        let (h, w) = image.dim();
        tracing::debug!(step, name, caption, height = h, width = w, "Image logged");
    }
}
