//! Client for the Yoctopuce hub HTTP API (VirtualHub or YoctoHub).
//!
//! The hub exposes every connected module under
//! `/bySerial/<serial>/api/<function>.json`. Sensor values are reported as
//! 16.16 fixed-point integers in `currentValue`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use sensorlink_bridge_framework::ReadError;

/// Value the vendor SDK reports for a sensor that has no valid reading.
pub const CURRENT_VALUE_INVALID: f64 = -f64::MAX;

/// Raw `currentValue` the hub sends when the measure is invalid.
const RAW_INVALID: i64 = i32::MIN as i64;

/// Errors talking to the hub.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Transport(String),

    #[error("hub returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("malformed hub response: {0}")]
    Malformed(String),

    #[error("invalid hardware id '{0}' (expected SERIAL.function)")]
    InvalidHardwareId(String),
}

impl From<HubError> for ReadError {
    fn from(err: HubError) -> Self {
        match err {
            // The hub answers 404 for modules that are not plugged in.
            HubError::Status { status: 404, .. } => ReadError::Offline,
            HubError::Transport(msg) => ReadError::Transport(msg),
            HubError::Status { .. } => ReadError::Transport(err.to_string()),
            HubError::Malformed(msg) => ReadError::Malformed(msg),
            HubError::InvalidHardwareId(_) => ReadError::Malformed(err.to_string()),
        }
    }
}

/// A module listed in the hub's white pages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub serial_number: String,
    #[serde(default)]
    pub logical_name: String,
    #[serde(default)]
    pub product_name: String,
}

/// A function listed in the hub's yellow pages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    /// `SERIAL.function`
    pub hardware_id: String,
    #[serde(default)]
    pub logical_name: String,
    #[serde(default)]
    pub advertised_value: String,
}

/// A registered hub.
#[derive(Debug, Clone)]
pub struct YoctoHub {
    base_url: String,
    client: reqwest::Client,
}

impl YoctoHub {
    /// Register a hub, checking that it answers.
    ///
    /// `timeout` bounds every later request to this hub as well.
    pub async fn register(url: &str, timeout: Duration) -> Result<Self, HubError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HubError::Transport(e.to_string()))?;

        let hub = Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        };

        let module = hub.get_json("/api/module.json").await?;
        let serial = module
            .get("serialNumber")
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::Malformed("module.json has no serialNumber".to_string()))?;
        info!(
            url = %hub.base_url,
            serial = %serial,
            product = module.get("productName").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Registered Yoctopuce hub"
        );

        Ok(hub)
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Modules currently known to the hub.
    pub async fn enumerate(&self) -> Result<Vec<ModuleInfo>, HubError> {
        let pages = self.get_json("/api/services/whitePages.json").await?;
        serde_json::from_value(pages).map_err(|e| HubError::Malformed(e.to_string()))
    }

    /// Functions currently known to the hub, across every class.
    pub async fn functions(&self) -> Result<Vec<FunctionInfo>, HubError> {
        let pages = self.get_json("/api/services/yellowPages.json").await?;
        let Value::Object(classes) = pages else {
            return Err(HubError::Malformed(
                "yellowPages.json is not an object".to_string(),
            ));
        };

        let mut functions = Vec::new();
        for (_, entries) in classes {
            let entries: Vec<FunctionInfo> =
                serde_json::from_value(entries).map_err(|e| HubError::Malformed(e.to_string()))?;
            functions.extend(entries);
        }
        Ok(functions)
    }

    /// Handle on one function, by `SERIAL.function` hardware id.
    ///
    /// Does not touch the network: the module may be unplugged right now.
    pub fn find(&self, hardware_id: &str) -> Result<YFunction, HubError> {
        let (serial, function) = hardware_id
            .split_once('.')
            .filter(|(s, f)| !s.is_empty() && !f.is_empty() && !f.contains(['.', '/']))
            .ok_or_else(|| HubError::InvalidHardwareId(hardware_id.to_string()))?;

        Ok(YFunction {
            hub: self.clone(),
            hardware_id: hardware_id.to_string(),
            path: format!("/bySerial/{}/api/{}.json", serial, function),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, HubError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HubError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HubError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| HubError::Malformed(format!("{}: {}", path, e)))
    }
}

/// One function (sensor channel) of a module behind a hub.
#[derive(Debug, Clone)]
pub struct YFunction {
    hub: YoctoHub,
    hardware_id: String,
    path: String,
}

impl YFunction {
    pub fn hardware_id(&self) -> &str {
        &self.hardware_id
    }

    /// Whether the hub can currently reach the function. Never fails.
    pub async fn is_online(&self) -> bool {
        match self.hub.get_json(&self.path).await {
            Ok(_) => true,
            Err(e) => {
                debug!(function = %self.hardware_id, error = %e, "function offline");
                false
            }
        }
    }

    /// Current measure, or [`CURRENT_VALUE_INVALID`] when the sensor has none.
    pub async fn current_value(&self) -> Result<f64, HubError> {
        let state = self.hub.get_json(&self.path).await?;
        parse_current_value(&state)
    }
}

/// Extract `currentValue` from a function's JSON state.
pub fn parse_current_value(state: &Value) -> Result<f64, HubError> {
    let raw = state
        .get("currentValue")
        .ok_or_else(|| HubError::Malformed("no currentValue in function state".to_string()))?;

    if let Some(raw) = raw.as_i64() {
        if raw == RAW_INVALID {
            return Ok(CURRENT_VALUE_INVALID);
        }
        return Ok(decode_fixed_point(raw));
    }

    match raw.as_f64() {
        Some(value) => Ok(value),
        None => Err(HubError::Malformed(format!(
            "currentValue is not a number: {}",
            raw
        ))),
    }
}

/// 16.16 fixed point to a value rounded to three decimals.
pub fn decode_fixed_point(raw: i64) -> f64 {
    (raw as f64 * 1000.0 / 65536.0).round() / 1000.0
}

/// False for the SDK sentinel and for anything non-finite.
pub fn is_valid_measure(value: f64) -> bool {
    value.is_finite() && value != CURRENT_VALUE_INVALID
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_fixed_point() {
        assert_eq!(decode_fixed_point(412 * 65536 + 19661), 412.3);
        assert_eq!(decode_fixed_point(0), 0.0);
        assert_eq!(decode_fixed_point(-65536), -1.0);
    }

    #[test]
    fn test_parse_current_value() {
        let state = json!({ "logicalName": "", "unit": "ppm", "currentValue": 27021312 });
        assert_eq!(parse_current_value(&state).unwrap(), 412.313);

        let invalid = json!({ "currentValue": i32::MIN });
        let value = parse_current_value(&invalid).unwrap();
        assert_eq!(value, CURRENT_VALUE_INVALID);
        assert!(!is_valid_measure(value));

        assert!(matches!(
            parse_current_value(&json!({ "unit": "ppm" })),
            Err(HubError::Malformed(_))
        ));
        assert!(matches!(
            parse_current_value(&json!({ "currentValue": "n/a" })),
            Err(HubError::Malformed(_))
        ));
    }

    #[test]
    fn test_is_valid_measure() {
        assert!(is_valid_measure(412.3));
        assert!(!is_valid_measure(f64::NAN));
        assert!(!is_valid_measure(f64::INFINITY));
        assert!(!is_valid_measure(CURRENT_VALUE_INVALID));
    }

    #[test]
    fn test_hub_error_to_read_error() {
        let offline: ReadError = HubError::Status {
            status: 404,
            path: "/bySerial/X/api/y.json".to_string(),
        }
        .into();
        assert_eq!(offline, ReadError::Offline);

        let transport: ReadError = HubError::Transport("connection refused".to_string()).into();
        assert_eq!(
            transport,
            ReadError::Transport("connection refused".to_string())
        );
    }
}
