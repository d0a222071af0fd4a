//! Simulated sensor for running the bridge without hardware.

use async_trait::async_trait;
use rand::Rng;

use sensorlink_bridge_framework::{
    ChannelDiagnostics, LastKnownValue, ReadError, Sample, SensorHandle,
};

use crate::config::SimulatedSensorConfig;

/// Always online; each read is `base` plus uniform noise in
/// `[-variation, variation]`.
pub struct SimulatedSensor {
    config: SimulatedSensorConfig,
    last: LastKnownValue,
}

impl SimulatedSensor {
    pub fn new(config: SimulatedSensorConfig) -> Self {
        Self {
            config,
            last: LastKnownValue::new(),
        }
    }

    fn next_value(&self) -> f64 {
        let variation = self.config.variation;
        let offset = if variation > 0.0 {
            rand::thread_rng().gen_range(-variation..=variation)
        } else {
            0.0
        };
        self.config.base + offset
    }
}

#[async_trait]
impl SensorHandle for SimulatedSensor {
    fn id(&self) -> &str {
        &self.config.source
    }

    async fn is_online(&self) -> bool {
        true
    }

    async fn read_current(&self) -> Result<Sample, ReadError> {
        let value = self.next_value();
        let sample = Sample::new(
            self.config.source.clone(),
            self.config.unit.clone(),
            [(self.config.metric.clone(), value)],
        )
        .map_err(|e| ReadError::Malformed(e.to_string()))?;

        self.last.record(value);
        Ok(sample)
    }

    fn diagnostics(&self) -> Vec<ChannelDiagnostics> {
        vec![ChannelDiagnostics {
            id: format!("{}.simulated", self.config.source),
            metric: self.config.metric.clone(),
            last_known_value: self.last.get(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_stay_within_variation() {
        let sensor = SimulatedSensor::new(SimulatedSensorConfig::default());
        assert!(sensor.is_online().await);

        for _ in 0..100 {
            let sample = sensor.read_current().await.unwrap();
            let value = sample.get("value").unwrap();
            assert!((19.0..=21.0).contains(&value), "{} out of range", value);
            assert_eq!(sample.unit(), "C");
            assert_eq!(sample.source(), "simulated");
        }

        let diagnostics = sensor.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].last_known_value.is_some());
    }

    #[tokio::test]
    async fn test_zero_variation_is_constant() {
        let sensor = SimulatedSensor::new(SimulatedSensorConfig {
            variation: 0.0,
            base: 412.0,
            metric: "co2".to_string(),
            unit: "ppm".to_string(),
            ..SimulatedSensorConfig::default()
        });

        let sample = sensor.read_current().await.unwrap();
        assert_eq!(sample.get("co2"), Some(412.0));
    }
}
