//! Console logging backend.

use super::MetricLogger;
use std::collections::HashMap;

/// Logger that prints metrics via tracing.
pub struct ConsoleLogger {
    run_name: Option<String>,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self { run_name: None }
    }

    /// Tag every line with the run name
    pub fn named(run_name: impl Into<String>) -> Self {
        Self {
            run_name: Some(run_name.into()),
        }
    }

    fn format_metrics(&self, metrics: &HashMap<String, f64>, step: u64) -> String {
        // One line per call, keys sorted
        let mut output = match &self.run_name {
            Some(name) => format!("[{}] Step {}: ", name, step),
            None => format!("Step {}: ", step),
        };
        let mut sorted: Vec<_> = metrics.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        for (i, (key, value)) in sorted.into_iter().enumerate() {
            if i > 0 {
                output.push_str(", ");
            }
            output.push_str(&format!("{}={:.4}", key, value));
        }
        output
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        match &self.run_name {
            Some(run) => tracing::info!("[{}] Step {}: {} = {:.4}", run, step, name, value),
            None => tracing::info!("Step {}: {} = {:.4}", step, name, value),
        }
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        tracing::info!("{}", self.format_metrics(metrics, step));
    }
}
