//! The poll-detect-publish loop.
//!
//! ```text
//!          tick boundary            online && read ok
//!  Idle ─────────────────► Sampling ─────────────────► Publishing
//!   ▲                          │                           │
//!   └──── offline / read failed┘◄──── every sink tried ────┘
//!
//!  any state ── cancellation seen at a tick boundary ──► Stopped
//! ```

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sensorlink_common::Sample;

use crate::config::LoopTiming;
use crate::error::{DeliveryError, FaultKind, ReadError};
use crate::publisher::{PublishStats, Publisher, TransportState};
use crate::sensor::{ChannelDiagnostics, SensorHandle};

const COMPONENT: &str = "poll_loop";

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Waiting for the next tick boundary.
    Idle,
    /// Liveness probe and read in flight.
    Sampling,
    /// Handing the sample to each sink in turn.
    Publishing,
    /// Cancellation observed; terminal.
    Stopped,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Sampling => "sampling",
            LoopState::Publishing => "publishing",
            LoopState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The liveness probe said no; nothing was read or published.
    SensorUnavailable,
    /// The read failed; nothing was published.
    ReadFailed(ReadError),
    /// A sample was captured and offered to every sink.
    Published(PublishStats),
}

/// Counters accumulated over the loop's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub sensor_unavailable: u64,
    pub read_failures: u64,
    pub samples: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

/// Drives one sensor and its sinks on a fixed cadence.
///
/// Ticks never overlap: the loop sleeps for the interval after a tick
/// completes, however long it took. Sinks are tried sequentially in the
/// order they were added, and a failing sink never prevents delivery to
/// the next one.
pub struct PollLoop {
    sensor: Box<dyn SensorHandle>,
    publishers: Vec<Box<dyn Publisher>>,
    timing: LoopTiming,
    state: LoopState,
    stats: LoopStats,
}

impl PollLoop {
    /// Create a loop for a sensor with no sinks yet.
    pub fn new(sensor: Box<dyn SensorHandle>, timing: LoopTiming) -> Self {
        Self {
            sensor,
            publishers: Vec::new(),
            timing,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Append a sink. Delivery order follows insertion order.
    pub fn with_publisher(mut self, publisher: Box<dyn Publisher>) -> Self {
        self.add_publisher(publisher);
        self
    }

    /// Append a sink. Delivery order follows insertion order.
    pub fn add_publisher(&mut self, publisher: Box<dyn Publisher>) {
        self.publishers.push(publisher);
    }

    pub fn sensor_id(&self) -> &str {
        self.sensor.id()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn timing(&self) -> LoopTiming {
        self.timing
    }

    /// Name and transport state of each sink, in delivery order.
    pub fn sink_states(&self) -> Vec<(String, TransportState)> {
        self.publishers
            .iter()
            .map(|p| (p.name().to_string(), p.transport_state()))
            .collect()
    }

    /// Run one poll-detect-publish cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        self.state = LoopState::Sampling;

        let sample = match self.sample().await {
            Ok(sample) => sample,
            Err(outcome) => {
                self.state = LoopState::Idle;
                return outcome;
            }
        };

        self.state = LoopState::Publishing;
        let stats = self.publish(&sample).await;
        self.state = LoopState::Idle;

        TickOutcome::Published(stats)
    }

    /// Liveness probe then bounded read.
    async fn sample(&mut self) -> Result<Sample, TickOutcome> {
        if !self.sensor.is_online().await {
            self.stats.sensor_unavailable += 1;
            warn!(
                component = COMPONENT,
                fault = %FaultKind::Read,
                sensor = %self.sensor.id(),
                "sensor unavailable"
            );
            return Err(TickOutcome::SensorUnavailable);
        }

        let read_timeout = self.timing.read_timeout;
        let result = match tokio::time::timeout(read_timeout, self.sensor.read_current()).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout(read_timeout)),
        };

        match result {
            Ok(sample) => {
                self.stats.samples += 1;
                debug!(
                    sensor = %self.sensor.id(),
                    metrics = sample.len(),
                    timestamp = sample.timestamp(),
                    "sample captured"
                );
                Ok(sample)
            }
            Err(e) => {
                self.stats.read_failures += 1;
                warn!(
                    component = COMPONENT,
                    fault = %e.fault_kind(),
                    sensor = %self.sensor.id(),
                    error = %e,
                    last_known = %last_known_values(&self.sensor.diagnostics()),
                    "read failed"
                );
                Err(TickOutcome::ReadFailed(e))
            }
        }
    }

    /// Offer the sample to every sink, in order.
    async fn publish(&mut self, sample: &Sample) -> PublishStats {
        let mut stats = PublishStats::default();
        let deliver_timeout = self.timing.deliver_timeout;

        for publisher in self.publishers.iter_mut() {
            let result = match tokio::time::timeout(deliver_timeout, publisher.deliver(sample)).await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(deliver_timeout)),
            };

            match result {
                Ok(()) => {
                    stats.delivered += 1;
                    debug!(
                        sink = %publisher.name(),
                        endpoint = %publisher.endpoint(),
                        "sample delivered"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    match e.fault_kind() {
                        FaultKind::Programming => error!(
                            component = COMPONENT,
                            fault = %FaultKind::Programming,
                            sensor = %self.sensor.id(),
                            sink = %publisher.name(),
                            error = %e,
                            sample = ?sample,
                            "sample could not be serialized"
                        ),
                        kind => warn!(
                            component = COMPONENT,
                            fault = %kind,
                            sensor = %self.sensor.id(),
                            sink = %publisher.name(),
                            endpoint = %publisher.endpoint(),
                            state = %publisher.transport_state(),
                            error = %e,
                            "delivery failed"
                        ),
                    }
                }
            }
        }

        self.stats.deliveries += stats.delivered as u64;
        self.stats.delivery_failures += stats.failed as u64;
        stats
    }

    /// Tick until cancelled, then close every sink.
    ///
    /// Cancellation is honored at tick boundaries and while sleeping between
    /// ticks; an in-flight read or delivery is allowed to finish (each is
    /// bounded by its timeout).
    pub async fn run(&mut self, cancel: CancellationToken) -> LoopStats {
        info!(
            sensor = %self.sensor.id(),
            interval_secs = self.timing.interval.as_secs_f64(),
            sinks = self.publishers.len(),
            "Starting poll loop"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = self.tick().await;
            debug!(sensor = %self.sensor.id(), ?outcome, "tick complete");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.timing.interval) => {}
            }
        }

        self.stop().await;
        self.stats
    }

    /// Close every sink and enter the terminal state.
    pub async fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }

        for publisher in self.publishers.iter_mut() {
            publisher.close().await;
        }
        self.state = LoopState::Stopped;

        info!(
            sensor = %self.sensor.id(),
            ticks = self.stats.ticks,
            samples = self.stats.samples,
            deliveries = self.stats.deliveries,
            delivery_failures = self.stats.delivery_failures,
            "Poll loop stopped"
        );
    }

    /// Interval between ticks.
    pub fn interval(&self) -> Duration {
        self.timing.interval
    }
}

/// `metric=value` pairs for a log line; `-` marks a channel never read.
fn last_known_values(diagnostics: &[ChannelDiagnostics]) -> String {
    diagnostics
        .iter()
        .map(|d| match d.last_known_value {
            Some(value) => format!("{}={}", d.metric, value),
            None => format!("{}=-", d.metric),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
