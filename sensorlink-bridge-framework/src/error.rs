//! Error types for the bridge framework.
//!
//! Faults fall into four kinds, see [`FaultKind`]. Only startup faults are
//! fatal; everything raised while the loop runs is contained in one tick.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Classification attached to every fault log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Sensor subsystem unreachable or configuration invalid. Fatal.
    Startup,
    /// Device offline, SDK read error or read timeout. Tick skipped.
    Read,
    /// Sink unreachable, write rejected or publish timeout. Sink skipped for this tick.
    Delivery,
    /// A well-formed sample could not be serialized. Logged as a defect.
    Programming,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Startup => "startup",
            FaultKind::Read => "read",
            FaultKind::Delivery => "delivery",
            FaultKind::Programming => "programming",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that stop a bridge from starting.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The sensor subsystem (hub, SDK) cannot be reached at all.
    #[error("Sensor subsystem unavailable: {0}")]
    SensorSubsystem(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a sensor subsystem error.
    pub fn sensor_subsystem(msg: impl Into<String>) -> Self {
        Self::SensorSubsystem(msg.into())
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::Startup
    }
}

impl From<sensorlink_common::Error> for BridgeError {
    fn from(err: sensorlink_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// A failed sensor read. The tick that hit it publishes nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The device disappeared between the liveness probe and the read.
    #[error("sensor went offline during read")]
    Offline,

    /// The SDK returned its error sentinel (or a non-finite value) for a metric.
    #[error("metric '{metric}' returned an invalid value")]
    InvalidValue { metric: String },

    /// The transport to the sensor subsystem failed.
    #[error("sensor transport error: {0}")]
    Transport(String),

    /// The sensor subsystem answered with something unparseable.
    #[error("malformed sensor response: {0}")]
    Malformed(String),

    /// The read did not complete within its bound.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
}

impl ReadError {
    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::Read
    }
}

/// A failed delivery to one sink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// The sink could not be reached.
    #[error("sink unreachable: {0}")]
    Unreachable(String),

    /// The sink answered but refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The delivery did not complete within its bound.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The sample could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl DeliveryError {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            DeliveryError::Serialization(_) => FaultKind::Programming,
            _ => FaultKind::Delivery,
        }
    }
}

impl From<sensorlink_common::Error> for DeliveryError {
    fn from(err: sensorlink_common::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kinds() {
        assert_eq!(BridgeError::config("x").fault_kind(), FaultKind::Startup);
        assert_eq!(ReadError::Offline.fault_kind(), FaultKind::Read);
        assert_eq!(
            DeliveryError::Unreachable("broker".into()).fault_kind(),
            FaultKind::Delivery
        );
        assert_eq!(
            DeliveryError::Serialization("bad".into()).fault_kind(),
            FaultKind::Programming
        );
    }

    #[test]
    fn test_fault_kind_display() {
        assert_eq!(FaultKind::Read.to_string(), "read");
        assert_eq!(FaultKind::Programming.as_str(), "programming");
    }

    #[test]
    fn test_error_messages() {
        let err = ReadError::InvalidValue {
            metric: "co2".to_string(),
        };
        assert_eq!(err.to_string(), "metric 'co2' returned an invalid value");

        let err = DeliveryError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "delivery timed out after 5s");
    }
}
