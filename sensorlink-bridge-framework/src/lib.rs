//! SensorLink Bridge Framework
//!
//! Common abstractions for building bridges that poll a sensor and push each
//! reading to one or more sinks.
//!
//! # Overview
//!
//! This framework provides:
//! - [`SensorHandle`] trait for anything that can be probed and read
//! - [`Publisher`] trait for outbound sinks, with MQTT, InfluxDB and Zenoh
//!   implementations in [`sinks`]
//! - [`PollLoop`] for the poll-detect-publish cycle
//! - [`Supervisor`] for managing loop lifecycle (startup, shutdown, signal handling)
//! - [`BridgeConfig`] trait for configuration loading, env overrides and validation
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use sensorlink_bridge_framework::{BridgeArgs, BridgeConfig, PollLoop, ProcessEnv, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse();
//!     let config = MyBridgeConfig::load_with_env(args.resolve_config("mybridge.json5").as_deref(), &ProcessEnv)?;
//!
//!     let mut supervisor = Supervisor::init("mybridge", &config, Some(&args))?;
//!
//!     let mut poll_loop = PollLoop::new(my_sensor(&config).await?, config.poll().timing());
//!     for sink in &config.sinks {
//!         poll_loop.add_publisher(sink.build()?);
//!     }
//!     supervisor.spawn(poll_loop);
//!
//!     // Run until SIGINT/SIGTERM
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod poll_loop;
mod publisher;
mod runner;
mod sensor;
mod signals;
pub mod sinks;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, LoopTiming, PollConfig};
pub use error::{BridgeError, DeliveryError, FaultKind, ReadError, Result};
pub use poll_loop::{LoopState, LoopStats, PollLoop, TickOutcome};
pub use publisher::{PublishStats, Publisher, TransportState};
pub use runner::{LoopReport, Supervisor};
pub use sensor::{ChannelDiagnostics, LastKnownValue, SensorHandle};
pub use signals::ShutdownSignals;
pub use sinks::SinkConfig;

// Re-export commonly used types from sensorlink-common
pub use sensorlink_common::{
    EnvSource, Format, LoggingConfig, ProcessEnv, Sample, ZenohConfig,
};
