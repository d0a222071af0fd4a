//! Process-level supervision of poll loops.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sensorlink_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::poll_loop::{LoopState, LoopStats, PollLoop};
use crate::signals::ShutdownSignals;

/// Final report of one poll loop after shutdown.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    /// Sensor the loop drove.
    pub sensor: String,
    /// State the loop ended in (always `Stopped` after a clean shutdown).
    pub state: LoopState,
    /// Lifetime counters.
    pub stats: LoopStats,
}

/// Supervisor that owns the lifecycle of a bridge's poll loops.
///
/// Handles:
/// - Logging initialization
/// - Spawning each poll loop on its own task
/// - Waiting for a termination signal
/// - Cooperative cancellation, then waiting for every loop to stop
///
/// Loops share nothing; each gets a child cancellation token.
///
/// # Example
///
/// ```ignore
/// use sensorlink_bridge_framework::{BridgeArgs, BridgeConfig, PollLoop, Supervisor};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse();
///     let config = MyBridgeConfig::load_with_env(None, &ProcessEnv)?;
///
///     let mut supervisor = Supervisor::init("mybridge", &config, Some(&args))?;
///     supervisor.spawn(PollLoop::new(sensor, config.poll().timing()).with_publisher(sink));
///
///     supervisor.run().await?;
///     Ok(())
/// }
/// ```
pub struct Supervisor {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// Parent of every loop's cancellation token.
    cancel: CancellationToken,
    /// Spawned loops.
    loops: Vec<JoinHandle<LoopReport>>,
}

impl Supervisor {
    /// Create a supervisor without touching global logging state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cancel: CancellationToken::new(),
            loops: Vec::new(),
        }
    }

    /// Create a supervisor and initialize logging from the config, with an
    /// optional CLI log level override.
    pub fn init<C: BridgeConfig>(
        name: impl Into<String>,
        config: &C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                ..config.logging().clone()
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        let supervisor = Self::new(name);
        tracing::info!(
            bridge = %supervisor.name,
            version = %supervisor.version,
            "Starting bridge"
        );

        Ok(supervisor)
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of supervised loops.
    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Token that stops every loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start a poll loop on its own task.
    pub fn spawn(&mut self, mut poll_loop: PollLoop) {
        let token = self.cancel.child_token();
        let handle = tokio::spawn(async move {
            let stats = poll_loop.run(token).await;
            LoopReport {
                sensor: poll_loop.sensor_id().to_string(),
                state: poll_loop.state(),
                stats,
            }
        });
        self.loops.push(handle);
    }

    /// Run until a termination signal is received.
    ///
    /// Fails with [`BridgeError::Io`] if the signal handlers cannot be
    /// installed; the loops are stopped before returning.
    pub async fn run(self) -> Result<Vec<LoopReport>> {
        self.run_with_signals(ShutdownSignals::register()).await
    }

    async fn run_with_signals(
        self,
        signals: std::io::Result<ShutdownSignals>,
    ) -> Result<Vec<LoopReport>> {
        match signals {
            Ok(mut signals) => self.run_until(async move { signals.recv().await }).await,
            Err(e) => {
                tracing::error!(
                    bridge = %self.name,
                    error = %e,
                    "Failed to install termination signal handlers"
                );
                self.shutdown().await;
                Err(BridgeError::Io(e))
            }
        }
    }

    /// Run until `shutdown` completes.
    ///
    /// This will:
    /// 1. Wait for the shutdown future
    /// 2. Cancel every loop (honored at the next tick boundary)
    /// 3. Wait for every loop to reach `Stopped` and close its sinks
    pub async fn run_until<F>(self, shutdown: F) -> Result<Vec<LoopReport>>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            bridge = %self.name,
            loops = self.loops.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        shutdown.await;

        tracing::info!(bridge = %self.name, "Received shutdown signal");
        let reports = self.shutdown().await;

        Ok(reports)
    }

    /// Cancel every loop and wait for it to stop.
    async fn shutdown(self) -> Vec<LoopReport> {
        self.cancel.cancel();

        let mut reports = Vec::with_capacity(self.loops.len());
        for handle in self.loops {
            match handle.await {
                Ok(report) => {
                    tracing::info!(
                        sensor = %report.sensor,
                        state = %report.state,
                        ticks = report.stats.ticks,
                        "Poll loop finished"
                    );
                    reports.push(report);
                }
                Err(e) => tracing::error!(error = %e, "Poll loop task failed"),
            }
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopTiming;
    use crate::error::ReadError;
    use crate::sensor::SensorHandle;
    use async_trait::async_trait;
    use sensorlink_common::Sample;
    use std::time::Duration;

    struct OfflineSensor(&'static str);

    #[async_trait]
    impl SensorHandle for OfflineSensor {
        fn id(&self) -> &str {
            self.0
        }

        async fn is_online(&self) -> bool {
            false
        }

        async fn read_current(&self) -> std::result::Result<Sample, ReadError> {
            Err(ReadError::Offline)
        }
    }

    fn timing() -> LoopTiming {
        LoopTiming {
            interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(1),
            deliver_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_run_until_stops_every_loop() {
        let mut supervisor = Supervisor::new("test");
        supervisor.spawn(PollLoop::new(Box::new(OfflineSensor("a")), timing()));
        supervisor.spawn(PollLoop::new(Box::new(OfflineSensor("b")), timing()));
        assert_eq!(supervisor.loop_count(), 2);

        let reports = tokio::time::timeout(
            Duration::from_secs(5),
            supervisor.run_until(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await
        .expect("shutdown should not wait for the next interval")
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].sensor, "a");
        assert_eq!(reports[1].sensor, "b");
        for report in &reports {
            assert_eq!(report.state, LoopState::Stopped);
            assert_eq!(report.stats.ticks, 1);
            assert_eq!(report.stats.sensor_unavailable, 1);
        }
    }

    #[tokio::test]
    async fn test_signal_registration_failure_is_an_error() {
        let mut supervisor = Supervisor::new("test");
        let token = supervisor.cancellation_token();
        supervisor.spawn(PollLoop::new(Box::new(OfflineSensor("a")), timing()));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            supervisor.run_with_signals(Err(std::io::Error::other("signals unavailable"))),
        )
        .await
        .expect("loops should be stopped before returning");

        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let supervisor = Supervisor::new("test");
        let token = supervisor.cancellation_token();
        token.cancel();

        let reports = supervisor.run_until(async {}).await.unwrap();
        assert!(reports.is_empty());
        assert!(token.is_cancelled());
    }
}
