//! Built-in publishers.
//!
//! - [`mqtt`] - flat JSON on an MQTT topic
//! - [`influx`] - line protocol to InfluxDB v2
//! - [`zenoh`] - JSON or CBOR on a Zenoh key expression

pub mod influx;
pub mod mqtt;
pub mod zenoh;

use serde::{Deserialize, Serialize};

use sensorlink_common::EnvSource;

use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;

pub use self::influx::{InfluxPublisher, InfluxSinkConfig, line_protocol};
pub use self::mqtt::{MqttPublisher, MqttSinkConfig};
pub use self::zenoh::{ZenohPublisher, ZenohSinkConfig};

/// Environment variable holding a comma-separated list of sink kinds.
pub const ENV_SINKS: &str = "SENSORLINK_SINKS";

/// Configuration of one sink, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Mqtt(MqttSinkConfig),
    Influx(InfluxSinkConfig),
    Zenoh(ZenohSinkConfig),
}

impl SinkConfig {
    /// Default configuration for a sink kind ("mqtt", "influx" or "zenoh").
    pub fn default_for(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "mqtt" => Some(SinkConfig::Mqtt(MqttSinkConfig::default())),
            "influx" | "influxdb" => Some(SinkConfig::Influx(InfluxSinkConfig::default())),
            "zenoh" => Some(SinkConfig::Zenoh(ZenohSinkConfig::default())),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Mqtt(_) => "mqtt",
            SinkConfig::Influx(_) => "influx",
            SinkConfig::Zenoh(_) => "zenoh",
        }
    }

    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        match self {
            SinkConfig::Mqtt(config) => config.apply_env(env),
            SinkConfig::Influx(config) => config.apply_env(env),
            SinkConfig::Zenoh(_) => Ok(()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SinkConfig::Mqtt(config) => config.validate(),
            SinkConfig::Influx(config) => config.validate(),
            SinkConfig::Zenoh(config) => config.validate(),
        }
    }

    /// Build the publisher. No connection is opened here.
    pub fn build(&self) -> Result<Box<dyn Publisher>> {
        let publisher: Box<dyn Publisher> = match self {
            SinkConfig::Mqtt(config) => Box::new(MqttPublisher::new(config.clone())?),
            SinkConfig::Influx(config) => Box::new(InfluxPublisher::new(config.clone())?),
            SinkConfig::Zenoh(config) => Box::new(ZenohPublisher::new(config.clone())?),
        };
        Ok(publisher)
    }
}

/// Sink list from `SENSORLINK_SINKS`, if set.
///
/// Kinds keep the order given; an unknown kind is a configuration error.
pub fn sinks_from_env(env: &dyn EnvSource) -> Result<Option<Vec<SinkConfig>>> {
    let Some(raw) = env.var(ENV_SINKS) else {
        return Ok(None);
    };

    raw.split(',')
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(|kind| {
            SinkConfig::default_for(kind).ok_or_else(|| {
                BridgeError::validation(format!("{}: unknown sink kind '{}'", ENV_SINKS, kind))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tagged_sink_configs() {
        let sinks: Vec<SinkConfig> = sensorlink_common::parse_config(
            r#"[
                { type: "mqtt", host: "broker.local", topic: "lab/co2" },
                { type: "influx", org: "lab", bucket: "air", token: "t" },
                { type: "zenoh", key_prefix: "lab/air", format: "cbor" },
            ]"#,
        )
        .unwrap();

        assert_eq!(sinks.len(), 3);
        match &sinks[0] {
            SinkConfig::Mqtt(config) => {
                assert_eq!(config.host, "broker.local");
                assert_eq!(config.port, 1883);
                assert_eq!(config.topic, "lab/co2");
            }
            other => panic!("expected mqtt, got {:?}", other),
        }
        assert_eq!(sinks[1].kind(), "influx");
        assert_eq!(sinks[2].kind(), "zenoh");
        for sink in &sinks {
            assert!(sink.validate().is_ok(), "{:?}", sink);
        }
    }

    #[test]
    fn test_sinks_from_env() {
        assert_eq!(sinks_from_env(&env(&[])).unwrap(), None);

        let sinks = sinks_from_env(&env(&[(ENV_SINKS, "influx, mqtt")]))
            .unwrap()
            .unwrap();
        assert_eq!(
            sinks.iter().map(SinkConfig::kind).collect::<Vec<_>>(),
            vec!["influx", "mqtt"]
        );

        assert!(sinks_from_env(&env(&[(ENV_SINKS, "mqtt,kafka")])).is_err());
    }

    #[test]
    fn test_build_fails_without_influx_token() {
        let sink = SinkConfig::default_for("influx").unwrap();
        assert!(sink.build().is_err());

        let sink = SinkConfig::default_for("mqtt").unwrap();
        let publisher = sink.build().unwrap();
        assert_eq!(publisher.name(), "mqtt");
    }
}
