//! The sample captured by one sensor read.

use crate::error::{Error, Result};

/// Keys that the flat wire payload uses for sample metadata.
///
/// A metric may not reuse one of these names.
pub const RESERVED_KEYS: [&str; 3] = ["unit", "source", "timestamp"];

/// One immutable, fully-formed set of sensor readings captured at a single instant.
///
/// A `Sample` can only be built from a complete read: it always holds at
/// least one metric, metric names are unique, and every value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Unix epoch milliseconds when the readings were captured.
    timestamp: i64,

    /// Identifier of the originating sensor (e.g., "YCO2MK02-11E865").
    source: String,

    /// Unit tag carried with the readings (e.g., "ppm", "C").
    unit: String,

    /// Metric name to value, in capture order.
    fields: Vec<(String, f64)>,
}

impl Sample {
    /// Build a sample stamped with the current time.
    pub fn new<I, K>(source: impl Into<String>, unit: impl Into<String>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self::with_timestamp(current_timestamp_millis(), source, unit, fields)
    }

    /// Build a sample with an explicit capture timestamp (Unix epoch milliseconds).
    pub fn with_timestamp<I, K>(
        timestamp: i64,
        source: impl Into<String>,
        unit: impl Into<String>,
        fields: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let source = source.into();
        let mut collected: Vec<(String, f64)> = Vec::new();

        for (name, value) in fields {
            let name = name.into();
            if name.is_empty() {
                return Err(Error::InvalidSample(format!(
                    "sample from '{}' has an empty metric name",
                    source
                )));
            }
            if RESERVED_KEYS.contains(&name.as_str()) {
                return Err(Error::InvalidSample(format!(
                    "metric name '{}' is reserved",
                    name
                )));
            }
            if !value.is_finite() {
                return Err(Error::InvalidSample(format!(
                    "metric '{}' has non-finite value {}",
                    name, value
                )));
            }
            if collected.iter().any(|(existing, _)| *existing == name) {
                return Err(Error::InvalidSample(format!(
                    "metric '{}' appears more than once",
                    name
                )));
            }
            collected.push((name, value));
        }

        if collected.is_empty() {
            return Err(Error::InvalidSample(format!(
                "sample from '{}' has no metrics",
                source
            )));
        }

        Ok(Self {
            timestamp,
            source,
            unit: unit.into(),
            fields: collected,
        })
    }

    /// Capture time in Unix epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Capture time in Unix epoch nanoseconds, as time-series stores expect.
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp.saturating_mul(1_000_000)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Metrics in capture order.
    pub fn fields(&self) -> &[(String, f64)] {
        &self.fields
    }

    /// Look up a single metric by name.
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }

    /// Number of metrics in this sample.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false for a constructed sample; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation() {
        let sample = Sample::new(
            "YCO2MK02-11E865",
            "ppm",
            [("co2", 412.3), ("humidity", 44.1), ("pressure", 1013.2)],
        )
        .unwrap();

        assert_eq!(sample.source(), "YCO2MK02-11E865");
        assert_eq!(sample.unit(), "ppm");
        assert_eq!(sample.len(), 3);
        assert_eq!(sample.get("humidity"), Some(44.1));
        assert_eq!(sample.get("temperature"), None);

        let names: Vec<&str> = sample.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["co2", "humidity", "pressure"]);
    }

    #[test]
    fn test_timestamp_nanos() {
        let sample = Sample::with_timestamp(1_700_000_000_123, "bot", "C", [("value", 20.5)]).unwrap();
        assert_eq!(sample.timestamp(), 1_700_000_000_123);
        assert_eq!(sample.timestamp_nanos(), 1_700_000_000_123_000_000);
    }

    #[test]
    fn test_rejects_empty_fields() {
        let fields: Vec<(String, f64)> = Vec::new();
        let result = Sample::new("bot", "C", fields);
        assert!(matches!(result, Err(Error::InvalidSample(_))));
    }

    #[test]
    fn test_rejects_reserved_and_duplicate_names() {
        assert!(Sample::new("bot", "C", [("unit", 1.0)]).is_err());
        assert!(Sample::new("bot", "C", [("timestamp", 1.0)]).is_err());
        assert!(Sample::new("bot", "C", [("value", 1.0), ("value", 2.0)]).is_err());
        assert!(Sample::new("bot", "C", [("", 1.0)]).is_err());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        assert!(Sample::new("bot", "C", [("value", f64::NAN)]).is_err());
        assert!(Sample::new("bot", "C", [("value", f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(current_timestamp_millis() > 1_577_836_800_000);
    }
}
