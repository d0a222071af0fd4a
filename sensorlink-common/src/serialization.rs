//! Payload encoding for samples.
//!
//! Samples travel as a flat map: every metric is a top-level numeric entry,
//! followed by the `unit` tag and, when requested, `source` and `timestamp`.
//!
//! ```text
//! {"co2":412.3,"humidity":44.1,"pressure":1013.2,"unit":"ppm"}
//! ```

use std::fmt;

use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::sample::Sample;

/// Serialization format for payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, what most dashboards expect).
    #[default]
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Try to auto-detect the format from the data.
///
/// Returns `Json` if the data starts with `{` or `[`, otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.first() {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    decode(data, detect_format(data))
}

/// Borrowed view of a sample, serialized as a flat payload.
#[derive(Debug, Clone, Copy)]
pub struct SamplePayload<'a> {
    sample: &'a Sample,
    metadata: bool,
}

impl<'a> SamplePayload<'a> {
    /// Metrics and unit only.
    pub fn new(sample: &'a Sample) -> Self {
        Self {
            sample,
            metadata: false,
        }
    }

    /// Also include `source` and `timestamp` entries.
    pub fn with_metadata(sample: &'a Sample) -> Self {
        Self {
            sample,
            metadata: true,
        }
    }
}

impl Serialize for SamplePayload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let extra = if self.metadata { 3 } else { 1 };
        let mut map = serializer.serialize_map(Some(self.sample.len() + extra))?;
        for (name, value) in self.sample.fields() {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("unit", self.sample.unit())?;
        if self.metadata {
            map.serialize_entry("source", self.sample.source())?;
            map.serialize_entry("timestamp", &self.sample.timestamp())?;
        }
        map.end()
    }
}

/// Decoded flat payload, as a subscriber sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Metrics in document order.
    pub fields: Vec<(String, f64)>,
    pub unit: String,
    pub source: Option<String>,
    pub timestamp: Option<i64>,
}

impl Payload {
    /// Look up a single metric by name.
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = Payload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a flat map of numeric metrics with a unit tag")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Payload, A::Error> {
                let mut fields = Vec::new();
                let mut unit = None;
                let mut source = None;
                let mut timestamp = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "unit" => unit = Some(map.next_value::<String>()?),
                        "source" => source = Some(map.next_value::<String>()?),
                        "timestamp" => timestamp = Some(map.next_value::<i64>()?),
                        _ => {
                            let value = map.next_value::<f64>()?;
                            fields.push((key, value));
                        }
                    }
                }

                let unit = unit.ok_or_else(|| de::Error::missing_field("unit"))?;

                Ok(Payload {
                    fields,
                    unit,
                    source,
                    timestamp,
                })
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

/// Encode a sample as a flat payload.
///
/// With `metadata` set, `source` and `timestamp` are appended after the unit.
pub fn encode_sample(sample: &Sample, format: Format, metadata: bool) -> Result<Vec<u8>> {
    let payload = if metadata {
        SamplePayload::with_metadata(sample)
    } else {
        SamplePayload::new(sample)
    };
    encode(&payload, format)
}

/// Decode a flat payload produced by [`encode_sample`].
pub fn decode_payload(data: &[u8], format: Format) -> Result<Payload> {
    let payload: Payload = decode(data, format)?;
    if payload.fields.is_empty() {
        return Err(Error::InvalidPayload("payload carries no metrics".to_string()));
    }
    Ok(payload)
}
