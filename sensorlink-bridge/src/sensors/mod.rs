//! Sensor implementations and their construction from configuration.

mod simulated;
mod yocto;

use std::time::Duration;

use tracing::{info, warn};

use sensorlink_bridge_framework::{BridgeError, SensorHandle};

use crate::config::SensorConfig;
use crate::hub::YoctoHub;

pub use simulated::SimulatedSensor;
pub use yocto::YoctoSensor;

/// Build the configured sensor.
///
/// For Yoctopuce sensors the hub must answer now; an unplugged module is
/// not an error here and simply reads as offline later.
pub async fn open_sensor(config: &SensorConfig) -> Result<Box<dyn SensorHandle>, BridgeError> {
    match config {
        SensorConfig::Yocto(yocto) => {
            let timeout = Duration::from_millis(yocto.request_timeout_ms);
            let hub = YoctoHub::register(&yocto.hub_url, timeout)
                .await
                .map_err(|e| {
                    BridgeError::sensor_subsystem(format!("{}: {}", yocto.hub_url, e))
                })?;

            let sensor = YoctoSensor::new(&hub, yocto)
                .map_err(|e| BridgeError::validation(e.to_string()))?;

            if !sensor.is_online().await {
                warn!(
                    sensor = %sensor.id(),
                    function = sensor.primary().unwrap_or_default(),
                    "Sensor not reachable yet; polling anyway"
                );
            }

            Ok(Box::new(sensor))
        }
        SensorConfig::Simulated(simulated) => {
            info!(
                sensor = %simulated.source,
                base = simulated.base,
                variation = simulated.variation,
                "Using simulated sensor"
            );
            Ok(Box::new(SimulatedSensor::new(simulated.clone())))
        }
    }
}
