//! Metric sinks for per-update training statistics.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Receives the scalar metrics each agent reports after an update.
///
/// Keys are `{agent}/{metric}`, e.g. `ego/approx_kl`; `step` is the agent's
/// global step.
pub trait MetricLogger: Send + Sync {
    fn log_scalar(&self, name: &str, value: f64, step: u64);

    /// Log every metric of one update
    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        for (name, value) in metrics {
            self.log_scalar(name, *value, step);
        }
    }

    /// Flush pending writes
    fn close(&self) {}
}

/// Discards everything. Agents start with this.
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn log_scalar(&self, _name: &str, _value: f64, _step: u64) {}
    fn log_metrics(&self, _metrics: &HashMap<String, f64>, _step: u64) {}
}

/// Fans each metric out to several sinks, e.g. console plus history.
#[derive(Default)]
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

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}

/// Latest value and step of every metric, shared between clones.
///
/// Hand one clone to each agent and keep one to read the final statistics
/// of a run.
#[derive(Clone, Default)]
pub struct MetricHistory {
    latest: Arc<Mutex<BTreeMap<String, (f64, u64)>>>,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        self.latest
            .lock()
            .ok()
            .and_then(|map| map.get(name).map(|&(value, _)| value))
    }

    /// Step at which `name` was last reported
    pub fn last_step(&self, name: &str) -> Option<u64> {
        self.latest
            .lock()
            .ok()
            .and_then(|map| map.get(name).map(|&(_, step)| step))
    }

    /// Latest values sorted by key
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.latest
            .lock()
            .map(|map| map.iter().map(|(k, &(v, _))| (k.clone(), v)).collect())
            .unwrap_or_default()
    }
}

impl MetricLogger for MetricHistory {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        if let Ok(mut map) = self.latest.lock() {
            map.insert(name.to_string(), (value, step));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<(String, f64, u64)>>>);

    impl MetricLogger for Capture {
        fn log_scalar(&self, name: &str, value: f64, step: u64) {
            self.0.lock().unwrap().push((name.to_string(), value, step));
        }
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Capture::default();
        let b = Capture::default();
        let mut composite = CompositeLogger::new(vec![Box::new(a.clone())]);
        composite.add(Box::new(b.clone()));

        let metrics = HashMap::from([("ego/entropy".to_string(), 1.5)]);
        composite.log_metrics(&metrics, 7);

        for capture in [a, b] {
            assert_eq!(
                *capture.0.lock().unwrap(),
                vec![("ego/entropy".to_string(), 1.5, 7)]
            );
        }
    }

    #[test]
    fn test_history_keeps_latest_value() {
        let history = MetricHistory::new();
        let reader = history.clone();
        history.log_scalar("ego/value_loss", 2.0, 10);
        history.log_scalar("ego/value_loss", 0.5, 20);
        history.log_scalar("partner/entropy", 1.3, 20);

        assert_eq!(reader.latest("ego/value_loss"), Some(0.5));
        assert_eq!(reader.last_step("ego/value_loss"), Some(20));
        assert_eq!(reader.latest("ego/entropy"), None);
        assert_eq!(
            reader.snapshot().keys().collect::<Vec<_>>(),
            vec!["ego/value_loss", "partner/entropy"]
        );
    }
}
