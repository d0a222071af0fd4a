//! InfluxDB v2 sink.
//!
//! Each sample becomes one line-protocol point POSTed to `/api/v2/write`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sensorlink_common::{EnvSource, Sample};

use crate::error::{BridgeError, DeliveryError, Result};
use crate::publisher::{Publisher, TransportState};

/// InfluxDB sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxSinkConfig {
    /// Base URL of the InfluxDB server.
    #[serde(default = "default_url")]
    pub url: String,

    /// Organization that owns the bucket.
    #[serde(default)]
    pub org: String,

    /// Destination bucket.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// API token. Usually supplied through `INFLUX_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,

    /// Measurement name for every point.
    #[serde(default = "default_measurement")]
    pub measurement: String,

    /// Static tags added to every point.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_bucket() -> String {
    "CO2bucket".to_string()
}

fn default_measurement() -> String {
    "Yoctopuce".to_string()
}

impl Default for InfluxSinkConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            org: String::new(),
            bucket: default_bucket(),
            token: None,
            measurement: default_measurement(),
            tags: BTreeMap::new(),
        }
    }
}

impl InfluxSinkConfig {
    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        if let Some(url) = env.var("INFLUX_URL") {
            self.url = url;
        }
        if let Some(org) = env.var("INFLUX_ORG") {
            self.org = org;
        }
        if let Some(bucket) = env.var("INFLUX_BUCKET") {
            self.bucket = bucket;
        }
        if let Some(token) = env.var("INFLUX_TOKEN") {
            self.token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(BridgeError::validation(format!(
                "influx: url must start with http:// or https:// (got '{}')",
                self.url
            )));
        }
        if self.org.is_empty() {
            return Err(BridgeError::validation("influx: org cannot be empty"));
        }
        if self.bucket.is_empty() {
            return Err(BridgeError::validation("influx: bucket cannot be empty"));
        }
        if self.measurement.is_empty() {
            return Err(BridgeError::validation("influx: measurement cannot be empty"));
        }
        if self.token.as_deref().is_none_or(str::is_empty) {
            return Err(BridgeError::validation(
                "influx: no token configured (set INFLUX_TOKEN)",
            ));
        }
        Ok(())
    }

    /// Write endpoint, without query parameters.
    pub fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.url.trim_end_matches('/'))
    }
}

/// Formats a sample as one InfluxDB line-protocol point.
///
/// Tags are the configured static tags plus `source` and `unit`, sorted by
/// key. Every metric becomes a float field; the timestamp is in nanoseconds.
pub fn line_protocol(
    measurement: &str,
    tags: &BTreeMap<String, String>,
    sample: &Sample,
) -> String {
    let mut line = escape_measurement(measurement);

    let mut all_tags: BTreeMap<&str, &str> = tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    all_tags.insert("source", sample.source());
    all_tags.insert("unit", sample.unit());

    for (key, value) in all_tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(value));
    }

    line.push(' ');
    let fields: Vec<String> = sample
        .fields()
        .iter()
        .map(|(name, value)| format!("{}={}", escape_tag(name), value))
        .collect();
    line.push_str(&fields.join(","));

    line.push(' ');
    line.push_str(&sample.timestamp_nanos().to_string());

    line
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys share the same escaping rules.
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Writes samples to an InfluxDB v2 bucket.
pub struct InfluxPublisher {
    config: InfluxSinkConfig,
    endpoint: String,
    token: String,
    client: Option<reqwest::Client>,
    state: TransportState,
}

impl InfluxPublisher {
    /// Create a publisher. A missing token is a startup error.
    pub fn new(config: InfluxSinkConfig) -> Result<Self> {
        config.validate()?;
        let token = config.token.clone().unwrap_or_default();
        Ok(Self {
            endpoint: config.write_url(),
            token,
            config,
            client: None,
            state: TransportState::Disconnected,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// The line this publisher would write for `sample`.
    pub fn format(&self, sample: &Sample) -> String {
        line_protocol(&self.config.measurement, &self.config.tags, sample)
    }
}

#[async_trait]
impl Publisher for InfluxPublisher {
    fn name(&self) -> &str {
        "influx"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_state(&self) -> TransportState {
        self.state
    }

    async fn deliver(&mut self, sample: &Sample) -> std::result::Result<(), DeliveryError> {
        let body = self.format(sample);

        if self.client.is_none() {
            self.state = TransportState::Connecting;
            info!(endpoint = %self.endpoint, bucket = %self.config.bucket, "Opening InfluxDB client");
        }
        let client = self.client.get_or_insert_with(reqwest::Client::new);

        let response = client
            .post(&self.endpoint)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.state = TransportState::Failed;
                return Err(DeliveryError::Unreachable(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            self.state = TransportState::Connected;
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            // The server is up; only this write was refused.
            self.state = TransportState::Connected;
            Err(DeliveryError::Rejected(format!("HTTP {}: {}", status, detail.trim())))
        } else {
            self.state = TransportState::Failed;
            Err(DeliveryError::Unreachable(format!("HTTP {}: {}", status, detail.trim())))
        }
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            debug!(endpoint = %self.endpoint, "InfluxDB client released");
        }
        self.state = TransportState::Disconnected;
    }
}
