//! Sink capability consumed by the poll loop.

use std::fmt;

use async_trait::async_trait;

use sensorlink_common::Sample;

use crate::error::DeliveryError;

/// Connection state of a sink's transport.
///
/// Owned and mutated only by the publisher it belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Never used, or closed.
    #[default]
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Last exchange with the sink succeeded.
    Connected,
    /// Last exchange with the sink failed.
    Failed,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Failed => "failed",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound sink (broker or time-series store).
///
/// A publisher connects lazily on its first delivery and keeps the
/// connection across ticks. Each call to [`deliver`](Self::deliver) makes
/// exactly one attempt; retrying is left to the next tick.
#[async_trait]
pub trait Publisher: Send {
    /// Sink identifier used in logs (e.g., "mqtt", "influx").
    fn name(&self) -> &str;

    /// Address of the sink (URI, host:port, key expression).
    fn endpoint(&self) -> &str;

    /// Current transport state.
    fn transport_state(&self) -> TransportState;

    /// Serialize the sample and attempt one delivery.
    async fn deliver(&mut self, sample: &Sample) -> Result<(), DeliveryError>;

    /// Release the transport. Called once when the loop stops.
    async fn close(&mut self) {}
}

/// Statistics from delivering one sample to every sink.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of sinks that accepted the sample.
    pub delivered: usize,
    /// Number of sinks that failed.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted deliveries.
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.delivered as f64 / self.total() as f64) * 100.0
        }
    }
}
