//! Configuration for the SensorLink bridge.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sensorlink_bridge_framework::sinks::{self, MqttSinkConfig};
use sensorlink_bridge_framework::{
    BridgeConfig, BridgeError, EnvSource, LoggingConfig, PollConfig, Result, SinkConfig,
};
use sensorlink_common::RESERVED_KEYS;

/// File looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "sensorlink.json5";

/// Environment variable overriding the Yoctopuce hub URL.
pub const ENV_HUB_URL: &str = "YOCTO_HUB_URL";

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorLinkConfig {
    /// The sensor to poll.
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Where readings go, in delivery order.
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig::Mqtt(MqttSinkConfig::default())]
}

impl Default for SensorLinkConfig {
    fn default() -> Self {
        Self {
            sensor: SensorConfig::default(),
            sinks: default_sinks(),
            poll: PollConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Sensor selection, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SensorConfig {
    /// A Yoctopuce module behind a VirtualHub or YoctoHub.
    Yocto(YoctoSensorConfig),
    /// Random values around a base, for running without hardware.
    Simulated(SimulatedSensorConfig),
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Yocto(YoctoSensorConfig::default())
    }
}

/// One metric of a Yoctopuce sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Name of the metric in the published payload.
    pub metric: String,
    /// Hardware id, `SERIAL.function`.
    pub function: String,
}

impl ChannelConfig {
    fn new(metric: &str, function: &str) -> Self {
        Self {
            metric: metric.to_string(),
            function: function.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoctoSensorConfig {
    /// Hub base URL.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Sample source identifier.
    #[serde(default = "default_yocto_source")]
    pub source: String,

    /// Unit tag published with every sample.
    #[serde(default = "default_yocto_unit")]
    pub unit: String,

    /// Channels in payload order. The first one is probed for liveness.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    /// Bound on every hub request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_hub_url() -> String {
    "http://127.0.0.1:4444".to_string()
}

fn default_yocto_source() -> String {
    "YCO2MK02-11E865".to_string()
}

fn default_yocto_unit() -> String {
    "ppm".to_string()
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig::new("co2", "YCO2MK02-11E865.carbonDioxide"),
        ChannelConfig::new("humidity", "YCO2MK02-11E865.humidity"),
        ChannelConfig::new("pressure", "YCO2MK02-11E865.pressure"),
    ]
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

impl Default for YoctoSensorConfig {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            source: default_yocto_source(),
            unit: default_yocto_unit(),
            channels: default_channels(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSensorConfig {
    #[serde(default = "default_simulated_source")]
    pub source: String,

    #[serde(default = "default_simulated_metric")]
    pub metric: String,

    #[serde(default = "default_simulated_unit")]
    pub unit: String,

    /// Centre of the generated values.
    #[serde(default = "default_base")]
    pub base: f64,

    /// Maximum distance from `base`.
    #[serde(default = "default_variation")]
    pub variation: f64,
}

fn default_simulated_source() -> String {
    "simulated".to_string()
}

fn default_simulated_metric() -> String {
    "value".to_string()
}

fn default_simulated_unit() -> String {
    "C".to_string()
}

fn default_base() -> f64 {
    20.0
}

fn default_variation() -> f64 {
    1.0
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            source: default_simulated_source(),
            metric: default_simulated_metric(),
            unit: default_simulated_unit(),
            base: default_base(),
            variation: default_variation(),
        }
    }
}

fn validate_metric(metric: &str, seen: &mut HashSet<String>) -> Result<()> {
    if metric.is_empty() {
        return Err(BridgeError::validation("sensor: metric name cannot be empty"));
    }
    if RESERVED_KEYS.contains(&metric) {
        return Err(BridgeError::validation(format!(
            "sensor: metric name '{}' is reserved",
            metric
        )));
    }
    if !seen.insert(metric.to_string()) {
        return Err(BridgeError::validation(format!(
            "sensor: duplicate metric '{}'",
            metric
        )));
    }
    Ok(())
}

impl SensorConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        match self {
            SensorConfig::Yocto(yocto) => {
                if !(yocto.hub_url.starts_with("http://") || yocto.hub_url.starts_with("https://")) {
                    return Err(BridgeError::validation(format!(
                        "sensor: hub_url must start with http:// or https:// (got '{}')",
                        yocto.hub_url
                    )));
                }
                if yocto.source.is_empty() {
                    return Err(BridgeError::validation("sensor: source cannot be empty"));
                }
                if yocto.channels.is_empty() {
                    return Err(BridgeError::validation(
                        "sensor: at least one channel is required",
                    ));
                }
                if yocto.request_timeout_ms == 0 {
                    return Err(BridgeError::validation(
                        "sensor: request_timeout_ms must be positive",
                    ));
                }
                for channel in &yocto.channels {
                    validate_metric(&channel.metric, &mut seen)?;
                    if !channel.function.contains('.') {
                        return Err(BridgeError::validation(format!(
                            "sensor: function '{}' must be SERIAL.function",
                            channel.function
                        )));
                    }
                }
            }
            SensorConfig::Simulated(simulated) => {
                if simulated.source.is_empty() {
                    return Err(BridgeError::validation("sensor: source cannot be empty"));
                }
                validate_metric(&simulated.metric, &mut seen)?;
                if !simulated.base.is_finite()
                    || !simulated.variation.is_finite()
                    || simulated.variation < 0.0
                {
                    return Err(BridgeError::validation(
                        "sensor: base must be finite and variation finite and non-negative",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl BridgeConfig for SensorLinkConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn poll(&self) -> &PollConfig {
        &self.poll
    }

    fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        self.poll.apply_env(env)?;

        if let Some(url) = env.var(ENV_HUB_URL) {
            if let SensorConfig::Yocto(yocto) = &mut self.sensor {
                yocto.hub_url = url;
            }
        }

        if let Some(sinks) = sinks::sinks_from_env(env)? {
            self.sinks = sinks;
        }
        for sink in &mut self.sinks {
            sink.apply_env(env)?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.poll.validate()?;
        self.sensor.validate()?;

        // Liveness probes run outside the loop's read timeout.
        if let SensorConfig::Yocto(yocto) = &self.sensor {
            let request_timeout = Duration::from_millis(yocto.request_timeout_ms);
            let interval = self.poll.timing().interval;
            if request_timeout >= interval {
                return Err(BridgeError::validation(format!(
                    "sensor: request timeout ({:?}) must be shorter than the poll interval ({:?})",
                    request_timeout, interval
                )));
            }
        }

        if self.sinks.is_empty() {
            return Err(BridgeError::validation("at least one sink is required"));
        }
        for sink in &self.sinks {
            sink.validate()?;
        }

        Ok(())
    }
}
