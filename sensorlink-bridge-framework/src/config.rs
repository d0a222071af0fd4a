//! Configuration traits and utilities.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sensorlink_common::{EnvSource, LoggingConfig, env_parse, load_config};

use crate::error::{BridgeError, Result};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// file loading, environment overrides, validation, and access to the
/// common sections.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use sensorlink_bridge_framework::{BridgeConfig, LoggingConfig, PollConfig};
///
/// #[derive(Debug, Default, Deserialize)]
/// pub struct MyBridgeConfig {
///     #[serde(default)]
///     pub logging: LoggingConfig,
///     #[serde(default)]
///     pub poll: PollConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn poll(&self) -> &PollConfig {
///         &self.poll
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned + Default {
    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Get the polling cadence configuration.
    fn poll(&self) -> &PollConfig;

    /// Apply environment overrides on top of file or default values.
    fn apply_env(&mut self, _env: &dyn EnvSource) -> Result<()> {
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation,
    /// keeping the polling checks.
    fn validate(&self) -> Result<()> {
        self.poll().validate()
    }

    /// Parse a JSON5 configuration file without validating it.
    fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        load_config(path).map_err(|e| BridgeError::ConfigParse(e.to_string()))
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply environment overrides.
    ///
    /// Without a file the built-in defaults are the base. Validation runs last,
    /// so a secret that is only supplied through the environment still counts.
    fn load_with_env(path: Option<&Path>, env: &dyn EnvSource) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::parse_file(path)?,
            None => Self::default(),
        };

        config.apply_env(env)?;
        config.validate()?;

        Ok(config)
    }
}

/// Polling cadence and per-operation time bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between the end of one tick and the start of the next.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for one sensor read, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Upper bound for one delivery to one sink, in milliseconds.
    #[serde(default = "default_deliver_timeout_ms")]
    pub deliver_timeout_ms: u64,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_read_timeout_ms() -> u64 {
    3_000
}

fn default_deliver_timeout_ms() -> u64 {
    5_000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            read_timeout_ms: default_read_timeout_ms(),
            deliver_timeout_ms: default_deliver_timeout_ms(),
        }
    }
}

impl PollConfig {
    /// Environment variable overriding the interval.
    pub const ENV_INTERVAL: &'static str = "POLL_INTERVAL_SECS";

    pub fn timing(&self) -> LoopTiming {
        LoopTiming {
            interval: Duration::from_secs(self.interval_secs),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            deliver_timeout: Duration::from_millis(self.deliver_timeout_ms),
        }
    }

    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        if let Some(secs) = env_parse::<u64>(env, Self::ENV_INTERVAL)? {
            self.interval_secs = secs;
        }
        Ok(())
    }

    /// Timeouts must be shorter than the interval so a stuck device or sink
    /// cannot starve the schedule.
    pub fn validate(&self) -> Result<()> {
        self.timing().validate()
    }
}

/// Resolved timing used by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub interval: Duration,
    pub read_timeout: Duration,
    pub deliver_timeout: Duration,
}

impl LoopTiming {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(BridgeError::validation("poll interval must be positive"));
        }
        if self.read_timeout.is_zero() || self.deliver_timeout.is_zero() {
            return Err(BridgeError::validation("timeouts must be positive"));
        }
        if self.read_timeout >= self.interval {
            return Err(BridgeError::validation(format!(
                "read timeout ({:?}) must be shorter than the poll interval ({:?})",
                self.read_timeout, self.interval
            )));
        }
        if self.deliver_timeout >= self.interval {
            return Err(BridgeError::validation(format!(
                "deliver timeout ({:?}) must be shorter than the poll interval ({:?})",
                self.deliver_timeout, self.interval
            )));
        }
        Ok(())
    }
}

impl Default for LoopTiming {
    fn default() -> Self {
        PollConfig::default().timing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Default, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        logging: LoggingConfig,
        #[serde(default)]
        poll: PollConfig,
    }

    impl BridgeConfig for TestConfig {
        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn poll(&self) -> &PollConfig {
            &self.poll
        }

        fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
            self.poll.apply_env(env)
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_file_with_env_override() {
        let path = std::env::temp_dir().join(format!(
            "sensorlink-framework-{}.json5",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "{ poll: { interval_secs: 20 }, logging: { level: 'debug' } }",
        )
        .unwrap();

        let env: HashMap<String, String> = [("POLL_INTERVAL_SECS".to_string(), "15".to_string())]
            .into_iter()
            .collect();
        let config = TestConfig::load_with_env(Some(path.as_path()), &env);

        std::fs::write(&path, "{ poll: ").unwrap();
        let broken = TestConfig::load(&path);
        std::fs::remove_file(&path).ok();

        let config = config.unwrap();
        assert_eq!(config.poll.interval_secs, 15);
        assert_eq!(config.logging.level, "debug");
        assert!(matches!(broken, Err(BridgeError::ConfigParse(_))));
    }

    #[test]
    fn test_defaults_without_file() {
        let env: HashMap<String, String> = HashMap::new();
        let config = TestConfig::load_with_env(None, &env).unwrap();
        assert_eq!(config.poll.interval_secs, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_interval_override() {
        let env: HashMap<String, String> = [("POLL_INTERVAL_SECS".to_string(), "30".to_string())]
            .into_iter()
            .collect();
        let config = TestConfig::load_with_env(None, &env).unwrap();
        assert_eq!(config.poll.timing().interval, Duration::from_secs(30));
    }

    #[test]
    fn test_env_interval_invalid() {
        let env: HashMap<String, String> =
            [("POLL_INTERVAL_SECS".to_string(), "soon".to_string())]
                .into_iter()
                .collect();
        assert!(TestConfig::load_with_env(None, &env).is_err());
    }

    #[test]
    fn test_timeout_must_be_shorter_than_interval() {
        let poll = PollConfig {
            interval_secs: 2,
            read_timeout_ms: 2_000,
            deliver_timeout_ms: 500,
        };
        assert!(matches!(
            poll.validate(),
            Err(BridgeError::ConfigValidation(_))
        ));

        let poll = PollConfig {
            interval_secs: 0,
            ..PollConfig::default()
        };
        assert!(poll.validate().is_err());

        assert!(PollConfig::default().validate().is_ok());
    }
}
