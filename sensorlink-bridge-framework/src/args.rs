//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "SensorLink telemetry bridge")]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5). Optional: built-in defaults and
    /// environment variables are used when the file does not exist.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments from the process command line.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// The config file to read, if any.
    ///
    /// An explicit `--config` always wins (and must exist). Otherwise
    /// `default_file` in the working directory, then in the per-user config
    /// directory, is used when present.
    pub fn resolve_config(&self, default_file: &str) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }

        let local = PathBuf::from(default_file);
        if local.exists() {
            return Some(local);
        }

        sensorlink_common::user_config_path(default_file).filter(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_args() {
        let args = BridgeArgs::try_parse_from([
            "sensorlink-bridge",
            "--config",
            "site.json5",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("site.json5")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_explicit_config_wins() {
        let args = BridgeArgs {
            config: Some(PathBuf::from("/nonexistent/explicit.json5")),
            log_level: None,
        };
        assert_eq!(
            args.resolve_config("sensorlink.json5"),
            Some(PathBuf::from("/nonexistent/explicit.json5"))
        );
    }

    #[test]
    fn test_no_config_found() {
        let args = BridgeArgs::try_parse_from(["sensorlink-bridge"]).unwrap();
        assert_eq!(
            args.resolve_config("definitely-missing-sensorlink-test.json5"),
            None
        );
    }
}
