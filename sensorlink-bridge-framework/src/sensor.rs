//! Sensor capability consumed by the poll loop.

use std::sync::RwLock;

use async_trait::async_trait;

use sensorlink_common::Sample;

use crate::error::ReadError;

/// One sensor, as the poll loop sees it.
///
/// Implementations wrap a vendor SDK (or a simulation) and are driven by a
/// single [`PollLoop`](crate::PollLoop): the loop calls [`is_online`](Self::is_online)
/// every tick and [`read_current`](Self::read_current) only when it returned `true`.
#[async_trait]
pub trait SensorHandle: Send + Sync {
    /// Stable identifier, used as the sample source and in logs.
    fn id(&self) -> &str;

    /// Cheap liveness probe.
    ///
    /// Never fails: an SDK-level error reads as offline. Probing has no side
    /// effects, so repeated calls without a read in between agree.
    async fn is_online(&self) -> bool;

    /// Read every metric and assemble them into one sample sharing one timestamp.
    ///
    /// If any metric fails the whole read fails; partial samples are never produced.
    async fn read_current(&self) -> Result<Sample, ReadError>;

    /// Per-channel diagnostics. Empty for sensors that keep none.
    fn diagnostics(&self) -> Vec<ChannelDiagnostics> {
        Vec::new()
    }
}

/// Diagnostic view of one channel of a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDiagnostics {
    /// Hardware or logical channel identifier.
    pub id: String,
    /// Metric name the channel feeds.
    pub metric: String,
    /// Last value successfully read, if any.
    pub last_known_value: Option<f64>,
}

/// Last value a channel returned.
///
/// Kept for diagnostics only; it is never substituted into a sample.
#[derive(Debug, Default)]
pub struct LastKnownValue(RwLock<Option<f64>>);

impl LastKnownValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, value: f64) {
        if let Ok(mut guard) = self.0.write() {
            *guard = Some(value);
        }
    }

    pub fn get(&self) -> Option<f64> {
        self.0.read().ok().and_then(|guard| *guard)
    }
}
