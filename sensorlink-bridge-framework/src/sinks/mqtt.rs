//! MQTT sink.
//!
//! One `rumqttc` client per publisher. The event loop runs on its own task,
//! owned by the publisher, and reports connection state through a watch
//! channel; it keeps reconnecting in the background after a failure.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sensorlink_common::{EnvSource, Format, Sample, encode_sample, env_parse};

use crate::error::{BridgeError, DeliveryError, FaultKind, Result};
use crate::publisher::{Publisher, TransportState};

/// MQTT sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttSinkConfig {
    /// Broker host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Topic every sample is published on.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Quality of service: 0, 1 or 2.
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Publish with the retain flag.
    #[serde(default)]
    pub retain: bool,

    /// Append `source` and `timestamp` to the payload.
    #[serde(default)]
    pub include_metadata: bool,

    /// Pause between reconnection attempts, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_host() -> String {
    "mosquitto".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "sensors/co2".to_string()
}

fn default_client_id() -> String {
    "sensorlink-bridge".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

impl Default for MqttSinkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            keepalive_secs: default_keepalive_secs(),
            username: None,
            password: None,
            qos: default_qos(),
            retain: false,
            include_metadata: false,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl MqttSinkConfig {
    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        if let Some(host) = env.var("MQTT_BROKER") {
            self.host = host;
        }
        if let Some(port) = env_parse::<u16>(env, "MQTT_PORT")? {
            self.port = port;
        }
        if let Some(topic) = env.var("MQTT_TOPIC") {
            self.topic = topic;
        }
        if let Some(username) = env.var("MQTT_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = env.var("MQTT_PASSWORD") {
            self.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::validation("mqtt: host cannot be empty"));
        }
        if self.topic.is_empty() || self.topic.contains(['#', '+']) {
            return Err(BridgeError::validation(format!(
                "mqtt: invalid publish topic '{}'",
                self.topic
            )));
        }
        if self.client_id.is_empty() {
            return Err(BridgeError::validation("mqtt: client_id cannot be empty"));
        }
        if self.keepalive_secs != 0 && self.keepalive_secs < 5 {
            return Err(BridgeError::validation(
                "mqtt: keepalive_secs must be 0 or at least 5",
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(BridgeError::validation(
                "mqtt: password given without username",
            ));
        }
        qos_from_u8(self.qos)?;
        Ok(())
    }

    /// `mqtt://host:port/topic`
    pub fn endpoint(&self) -> String {
        format!("mqtt://{}:{}/{}", self.host, self.port, self.topic)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keepalive_secs));
        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }
        options
    }
}

fn qos_from_u8(qos: u8) -> Result<QoS> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::validation(format!(
            "mqtt: qos must be 0, 1 or 2 (got {})",
            other
        ))),
    }
}

/// Live connection owned by one [`MqttPublisher`].
struct MqttConnection {
    client: AsyncClient,
    state: watch::Receiver<TransportState>,
    task: JoinHandle<()>,
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Publishes samples as flat JSON on one MQTT topic.
pub struct MqttPublisher {
    config: MqttSinkConfig,
    endpoint: String,
    qos: QoS,
    connection: Option<MqttConnection>,
}

impl MqttPublisher {
    /// Create a publisher. Nothing is connected until the first delivery.
    pub fn new(config: MqttSinkConfig) -> Result<Self> {
        config.validate()?;
        let qos = qos_from_u8(config.qos)?;
        Ok(Self {
            endpoint: config.endpoint(),
            config,
            qos,
            connection: None,
        })
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    fn open(config: &MqttSinkConfig, endpoint: &str) -> MqttConnection {
        let (client, eventloop) = AsyncClient::new(config.options(), 16);
        let (state_tx, state_rx) = watch::channel(TransportState::Connecting);
        let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);

        info!(endpoint = %endpoint, client_id = %config.client_id, "Connecting to MQTT broker");
        let task = tokio::spawn(drive_event_loop(
            eventloop,
            state_tx,
            endpoint.to_string(),
            reconnect_delay,
        ));

        MqttConnection {
            client,
            state: state_rx,
            task,
        }
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    state: watch::Sender<TransportState>,
    endpoint: String,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                state.send_replace(TransportState::Connected);
                info!(endpoint = %endpoint, "MQTT connected");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                state.send_replace(TransportState::Disconnected);
                debug!(endpoint = %endpoint, "MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let previous = state.send_replace(TransportState::Failed);
                if previous != TransportState::Failed {
                    warn!(
                        component = "mqtt",
                        fault = %FaultKind::Delivery,
                        sink = "mqtt",
                        endpoint = %endpoint,
                        error = %e,
                        "MQTT connection lost, reconnecting in background"
                    );
                } else {
                    debug!(endpoint = %endpoint, error = %e, "MQTT reconnect failed");
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        }

        if state.is_closed() {
            break;
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_state(&self) -> TransportState {
        self.connection
            .as_ref()
            .map(|c| *c.state.borrow())
            .unwrap_or_default()
    }

    async fn deliver(&mut self, sample: &Sample) -> std::result::Result<(), DeliveryError> {
        let payload = encode_sample(sample, Format::Json, self.config.include_metadata)?;

        let config = &self.config;
        let endpoint = &self.endpoint;
        let connection = self
            .connection
            .get_or_insert_with(|| Self::open(config, endpoint));

        // First use waits for the ConnAck (bounded by the loop's deliver timeout).
        let state = *connection
            .state
            .wait_for(|s| *s != TransportState::Connecting)
            .await
            .map_err(|_| DeliveryError::Unreachable("MQTT event loop stopped".to_string()))?;

        if state != TransportState::Connected {
            return Err(DeliveryError::Unreachable(format!(
                "broker {} is {}",
                endpoint, state
            )));
        }

        connection
            .client
            .publish(config.topic.clone(), self.qos, config.retain, payload)
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))
    }

    async fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        if let Err(e) = connection.client.disconnect().await {
            debug!(endpoint = %self.endpoint, error = %e, "MQTT disconnect request failed");
        }
        if tokio::time::timeout(Duration::from_secs(1), &mut connection.task)
            .await
            .is_err()
        {
            connection.task.abort();
        }

        info!(endpoint = %self.endpoint, "MQTT publisher closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = MqttSinkConfig::default();
        assert_eq!(config.host, "mosquitto");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic, "sensors/co2");
        assert_eq!(config.keepalive_secs, 60);
        assert_eq!(config.qos, 1);
        assert_eq!(config.endpoint(), "mqtt://mosquitto:1883/sensors/co2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<String, String> = [
            ("MQTT_BROKER", "127.0.0.1"),
            ("MQTT_PORT", "1884"),
            ("MQTT_TOPIC", "sensors/temperature"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut config = MqttSinkConfig::default();
        config.apply_env(&env).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 1884);
        assert_eq!(config.topic, "sensors/temperature");
    }

    #[test]
    fn test_validation() {
        let wildcard = MqttSinkConfig {
            topic: "sensors/#".to_string(),
            ..MqttSinkConfig::default()
        };
        assert!(wildcard.validate().is_err());

        let bad_qos = MqttSinkConfig {
            qos: 3,
            ..MqttSinkConfig::default()
        };
        assert!(bad_qos.validate().is_err());

        let orphan_password = MqttSinkConfig {
            password: Some("secret".to_string()),
            ..MqttSinkConfig::default()
        };
        assert!(orphan_password.validate().is_err());
    }

    #[test]
    fn test_new_publisher_is_lazy() {
        let publisher = MqttPublisher::new(MqttSinkConfig::default()).unwrap();
        assert_eq!(publisher.transport_state(), TransportState::Disconnected);
        assert_eq!(publisher.topic(), "sensors/co2");
    }
}
