//! Metric logging.
//!
//! Agents report per-update statistics through [`MetricLogger`]:
//! - `ConsoleLogger` - One `tracing` line per update
//! - `MetricHistory` - Latest value of each metric, readable after a run
//! - `CompositeLogger` - Fans out to several of the above

mod console;
mod logger;

pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, MetricHistory, MetricLogger, NoOpLogger};
