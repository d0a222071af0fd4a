//! SensorLink bridge.
//!
//! Polls one sensor on a fixed interval and pushes each complete reading
//! to the configured sinks (MQTT, InfluxDB, Zenoh).
//!
//! # Payload
//!
//! ```text
//! {"co2":412.3,"humidity":44.1,"pressure":1013.2,"unit":"ppm"}
//! ```
//!
//! Every metric of the sensor is a top-level float field; `unit` is the
//! configured unit tag.

pub mod config;
pub mod hub;
pub mod sensors;
