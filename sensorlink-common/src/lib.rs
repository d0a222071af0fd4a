//! SensorLink Common Library
//!
//! Shared types and utilities for SensorLink telemetry bridges:
//!
//! - [`sample`] - The immutable [`Sample`] produced by one sensor read
//! - [`serialization`] - Flat JSON/CBOR payload encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format) and environment overrides
//! - [`session`] - Zenoh session management
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod sample;
pub mod serialization;
pub mod session;

// Re-export commonly used types at the crate root
pub use config::{
    EnvSource, LogFormat, LoggingConfig, ProcessEnv, ZenohConfig, env_parse, load_config,
    parse_config, user_config_path,
};
pub use error::{Error, Result};
pub use sample::{RESERVED_KEYS, Sample, current_timestamp_millis};
pub use serialization::{
    Format, Payload, SamplePayload, decode, decode_auto, decode_payload, encode, encode_sample,
};
pub use session::connect;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// # Example
///
/// ```ignore
/// use sensorlink_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
