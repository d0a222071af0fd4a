//! Zenoh sink: puts each sample on `<key_prefix>/<source>`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ::zenoh::Session;

use sensorlink_common::{Format, Sample, ZenohConfig, encode_sample};

use crate::error::{BridgeError, DeliveryError, Result};
use crate::publisher::{Publisher, TransportState};

/// Zenoh sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohSinkConfig {
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Key expression prefix; the sample source is appended.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default)]
    pub format: Format,

    /// Append `source` and `timestamp` to the payload.
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

fn default_key_prefix() -> String {
    "sensorlink".to_string()
}

fn default_include_metadata() -> bool {
    true
}

impl Default for ZenohSinkConfig {
    fn default() -> Self {
        Self {
            zenoh: ZenohConfig::default(),
            key_prefix: default_key_prefix(),
            format: Format::default(),
            include_metadata: default_include_metadata(),
        }
    }
}

impl ZenohSinkConfig {
    pub fn validate(&self) -> Result<()> {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err(BridgeError::validation("zenoh: key_prefix cannot be empty"));
        }
        if prefix.contains(['*', '$', '?', '#']) {
            return Err(BridgeError::validation(format!(
                "zenoh: key_prefix '{}' must not contain wildcards",
                self.key_prefix
            )));
        }
        sensorlink_common::session::zenoh_config(&self.zenoh)?;
        Ok(())
    }
}

/// Publishes samples on the Zenoh network.
pub struct ZenohPublisher {
    config: ZenohSinkConfig,
    endpoint: String,
    session: Option<Arc<Session>>,
    owns_session: bool,
    state: TransportState,
}

impl ZenohPublisher {
    /// Create a publisher that opens its own session on first delivery.
    pub fn new(config: ZenohSinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            endpoint: format!("zenoh:{}/**", config.key_prefix.trim_matches('/')),
            config,
            session: None,
            owns_session: true,
            state: TransportState::Disconnected,
        })
    }

    /// Create a publisher on an existing session, which it will not close.
    pub fn with_session(config: ZenohSinkConfig, session: Arc<Session>) -> Result<Self> {
        let mut publisher = Self::new(config)?;
        publisher.session = Some(session);
        publisher.owns_session = false;
        publisher.state = TransportState::Connected;
        Ok(publisher)
    }

    /// Key expression a sample is put on.
    pub fn key_for(&self, sample: &Sample) -> String {
        format!("{}/{}", self.config.key_prefix.trim_matches('/'), sample.source())
    }

    async fn session(&mut self) -> std::result::Result<Arc<Session>, DeliveryError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        self.state = TransportState::Connecting;
        match sensorlink_common::connect(&self.config.zenoh).await {
            Ok(session) => {
                let session = Arc::new(session);
                self.session = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                self.state = TransportState::Failed;
                Err(DeliveryError::Unreachable(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Publisher for ZenohPublisher {
    fn name(&self) -> &str {
        "zenoh"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_state(&self) -> TransportState {
        self.state
    }

    async fn deliver(&mut self, sample: &Sample) -> std::result::Result<(), DeliveryError> {
        let payload = encode_sample(sample, self.config.format, self.config.include_metadata)?;
        let key = self.key_for(sample);
        let session = self.session().await?;

        match session.put(&key, payload).await {
            Ok(()) => {
                self.state = TransportState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = TransportState::Failed;
                Err(DeliveryError::Unreachable(format!("put on {}: {}", key, e)))
            }
        }
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if self.owns_session {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Error closing Zenoh session");
            }
            info!(endpoint = %self.endpoint, "Zenoh session closed");
        }
        self.state = TransportState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ZenohSinkConfig::default();
        assert_eq!(config.key_prefix, "sensorlink");
        assert_eq!(config.format, Format::Json);
        assert!(config.include_metadata);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_for_sample() {
        let publisher = ZenohPublisher::new(ZenohSinkConfig {
            key_prefix: "lab/air/".to_string(),
            ..ZenohSinkConfig::default()
        })
        .unwrap();
        let sample = Sample::new("YCO2MK02-11E865", "ppm", [("co2", 412.3)]).unwrap();

        assert_eq!(publisher.key_for(&sample), "lab/air/YCO2MK02-11E865");
        assert_eq!(publisher.endpoint(), "zenoh:lab/air/**");
        assert_eq!(publisher.transport_state(), TransportState::Disconnected);
    }

    #[test]
    fn test_wildcard_prefix_rejected() {
        let config = ZenohSinkConfig {
            key_prefix: "lab/*".to_string(),
            ..ZenohSinkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
