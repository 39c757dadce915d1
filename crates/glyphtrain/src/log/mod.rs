//! Unified logging system.
//!
//! Provides:
//! - `MetricLogger` trait for composable experiment-tracker backends
//! - `ConsoleLogger` for lightweight stdout logging
//! - `JsonlTracker` for a local, file-backed tracker with artifact storage
//! - `CompositeLogger` for multi-backend logging
//! - `LogSink` / `RunLogs` for the durable training and validation log streams
//! - `TrainRecord` / `ValRecord`, the line formats of those streams

mod console;
mod jsonl;
mod logger;
mod record;
mod sink;

pub use console::ConsoleLogger;
pub use jsonl::JsonlTracker;
pub use logger::{CompositeLogger, MetricLogger, NoOpLogger};
pub use record::{TrainRecord, ValRecord};
pub use sink::{LogSink, RunLogs, TRAIN_LOG, VAL_LOG};
