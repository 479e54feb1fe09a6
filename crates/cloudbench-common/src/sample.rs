//! Benchmark measurement samples

use crate::timestamp_millis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One measurement produced by a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Metric name (e.g. "tps")
    pub metric: String,
    pub value: f64,
    /// Unit of `value` (e.g. "transactions/s", "ms")
    pub unit: String,
    /// Free-form labels (run URI, cloud, per-second offset, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Milliseconds since UNIX epoch when the sample was recorded
    pub timestamp: i64,
}

impl Sample {
    pub fn new(metric: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value,
            unit: unit.into(),
            metadata: BTreeMap::new(),
            timestamp: timestamp_millis(),
        }
    }

    /// Attach a metadata label
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_metadata() {
        let sample = Sample::new("tps", 1234.5, "transactions/s")
            .with_metadata("clients", "16")
            .with_metadata("run_uri", "abc123");
        assert_eq!(sample.metric, "tps");
        assert_eq!(sample.metadata.get("clients").map(String::as_str), Some("16"));
        assert_eq!(sample.metadata.len(), 2);
        assert!(sample.timestamp > 0);
    }

    #[test]
    fn test_serialization() {
        let sample = Sample::new("latency_average", 12.5, "ms");
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["metric"], "latency_average");
        assert_eq!(json["unit"], "ms");
        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample);
    }
}
