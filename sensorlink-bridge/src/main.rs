//! SensorLink bridge.
//!
//! Polls a Yoctopuce (or simulated) sensor and publishes each reading to
//! MQTT, InfluxDB and/or Zenoh until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use tracing::info;

use sensorlink_bridge::config::{DEFAULT_CONFIG_FILE, SensorLinkConfig};
use sensorlink_bridge::sensors::open_sensor;
use sensorlink_bridge_framework::{
    BridgeArgs, BridgeConfig, PollLoop, ProcessEnv, Publisher, Supervisor,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    // Load configuration (file optional, environment on top)
    let config_path = args.resolve_config(DEFAULT_CONFIG_FILE);
    let config = SensorLinkConfig::load_with_env(config_path.as_deref(), &ProcessEnv)
        .with_context(|| match &config_path {
            Some(path) => format!("Failed to load config from {:?}", path),
            None => "Invalid configuration".to_string(),
        })?;

    let mut supervisor = Supervisor::init("sensorlink-bridge", &config, Some(&args))?;
    match &config_path {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => info!("No configuration file, using defaults and environment"),
    }

    let sensor = open_sensor(&config.sensor)
        .await
        .context("Failed to open sensor")?;

    let mut poll_loop = PollLoop::new(sensor, config.poll().timing());
    for sink in &config.sinks {
        let publisher = sink
            .build()
            .with_context(|| format!("Failed to configure {} sink", sink.kind()))?;
        info!(sink = sink.kind(), endpoint = %publisher.endpoint(), "Sink configured");
        poll_loop.add_publisher(publisher);
    }

    supervisor.spawn(poll_loop);
    supervisor.run().await?;

    Ok(())
}
