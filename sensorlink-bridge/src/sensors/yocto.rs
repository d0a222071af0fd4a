//! Yoctopuce module driven through a hub.

use async_trait::async_trait;
use tracing::debug;

use sensorlink_bridge_framework::{
    ChannelDiagnostics, LastKnownValue, ReadError, Sample, SensorHandle,
};

use crate::config::YoctoSensorConfig;
use crate::hub::{HubError, YFunction, YoctoHub, is_valid_measure};

struct Channel {
    metric: String,
    function: YFunction,
    last: LastKnownValue,
}

/// A multi-channel Yoctopuce sensor (e.g. the Yocto-CO2 with its CO2,
/// humidity and pressure functions).
///
/// The first channel is the primary one: the sensor is online when it is.
pub struct YoctoSensor {
    id: String,
    unit: String,
    channels: Vec<Channel>,
}

impl YoctoSensor {
    pub fn new(hub: &YoctoHub, config: &YoctoSensorConfig) -> Result<Self, HubError> {
        let channels = config
            .channels
            .iter()
            .map(|channel| {
                Ok(Channel {
                    metric: channel.metric.clone(),
                    function: hub.find(&channel.function)?,
                    last: LastKnownValue::new(),
                })
            })
            .collect::<Result<Vec<_>, HubError>>()?;

        Ok(Self {
            id: config.source.clone(),
            unit: config.unit.clone(),
            channels,
        })
    }

    /// Hardware id of the channel used as the liveness probe.
    pub fn primary(&self) -> Option<&str> {
        self.channels.first().map(|c| c.function.hardware_id())
    }
}

#[async_trait]
impl SensorHandle for YoctoSensor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_online(&self) -> bool {
        match self.channels.first() {
            Some(primary) => primary.function.is_online().await,
            None => false,
        }
    }

    async fn read_current(&self) -> Result<Sample, ReadError> {
        let mut fields = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let value = channel.function.current_value().await?;
            if !is_valid_measure(value) {
                return Err(ReadError::InvalidValue {
                    metric: channel.metric.clone(),
                });
            }
            fields.push((channel.metric.clone(), value));
        }

        for (channel, (_, value)) in self.channels.iter().zip(&fields) {
            channel.last.record(*value);
        }
        debug!(sensor = %self.id, channels = fields.len(), "read all channels");

        Sample::new(self.id.clone(), self.unit.clone(), fields)
            .map_err(|e| ReadError::Malformed(e.to_string()))
    }

    fn diagnostics(&self) -> Vec<ChannelDiagnostics> {
        self.channels
            .iter()
            .map(|channel| ChannelDiagnostics {
                id: channel.function.hardware_id().to_string(),
                metric: channel.metric.clone(),
                last_known_value: channel.last.get(),
            })
            .collect()
    }
}
