//! Decoding of the JSON messages Remote ID sensors publish over MQTT.
//!
//! A sensor publishes three kinds of message:
//!
//! - position updates for the sensor itself (topic contains `position`),
//! - detections, whose `data.UASdata` field carries a base64 Open Drone ID
//!   payload,
//! - status reports (`status` object).
//!
//! Payloads may be LZMA-compressed and may hold several JSON objects back to
//! back. [`SensorDecoder`] turns one MQTT publish into zero or more
//! [`SensorEvent`]s.

use std::collections::HashMap;

use base64::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::odid::{UasData, UNKNOWN_UAS_ID};

/// Detection message protocol version this decoder understands.
pub const SUPPORTED_PROTOCOL: &str = "1.0";

/// Topic fragment that marks sensor position updates.
const POSITION_TOPIC: &str = "position";

/// A decoded sensor message.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A Remote ID detection.
    Detection(Box<RemoteIdReport>),
    /// A sensor health report.
    Status(SensorStatus),
}

/// Receiver-side metadata that accompanies a detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverInfo {
    /// Sensor that heard the broadcast.
    pub sensor_id: Option<String>,
    /// Received signal strength.
    pub rssi: Option<String>,
    /// Radio channel.
    pub channel: Option<String>,
    /// Receive time as reported by the sensor.
    pub timestamp: Option<String>,
    /// Transmitter MAC address.
    pub mac_address: Option<String>,
    /// Broadcast transport (Bluetooth, Wi-Fi beacon, ...).
    pub payload_type: Option<String>,
}

impl ReceiverInfo {
    fn from_data(data: &Map<String, Value>) -> Self {
        let field = |key: &str| data.get(key).and_then(scalar_text);
        Self {
            sensor_id: field("sensor_id"),
            rssi: field("RSSI"),
            channel: field("channel"),
            timestamp: field("timestamp"),
            mac_address: field("MAC address"),
            payload_type: field("type"),
        }
    }
}

/// Serial-number extension some sensors attach to a detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialInfo {
    /// Whether the sensor validated the serial number.
    pub valid: Option<String>,
    /// Aircraft manufacturer.
    pub manufacturer: Option<String>,
    /// Aircraft model.
    pub model: Option<String>,
    /// Aircraft type as named by the manufacturer database.
    pub aircraft_type: Option<String>,
    /// Intended application.
    pub application: Option<String>,
    /// Aircraft weight.
    pub weight: Option<String>,
    /// Aircraft dimensions.
    pub dimensions: Option<String>,
}

impl SerialInfo {
    /// Read the extension; `None` unless `SN present` is 1.
    fn from_extra(extra: &Map<String, Value>) -> Option<Self> {
        if !extra.get("SN present").is_some_and(is_one) {
            return None;
        }
        let field = |key: &str| extra.get(key).and_then(scalar_text);
        Some(Self {
            valid: field("SN valid"),
            manufacturer: field("manufacturer"),
            model: field("model"),
            aircraft_type: field("type"),
            application: field("application"),
            weight: field("weight"),
            dimensions: field("dimensions"),
        })
    }

    /// `manufacturer model`, or whichever of the two is known.
    #[must_use]
    pub fn describe(&self) -> Option<String> {
        let parts: Vec<&str> = [self.manufacturer.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// A Remote ID detection with its receiver metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteIdReport {
    /// The decoded Open Drone ID payload.
    pub uas: UasData,
    /// Receiver metadata.
    pub receiver: ReceiverInfo,
    /// Serial-number extension.
    pub serial: Option<SerialInfo>,
    /// MQTT topic the detection arrived on.
    pub topic: String,
}

impl RemoteIdReport {
    /// The UAS identifier, falling back to a placeholder.
    #[must_use]
    pub fn uas_id(&self) -> &str {
        self.uas.uas_id().unwrap_or(UNKNOWN_UAS_ID)
    }

    /// The operator identifier, falling back to the UAS identifier.
    #[must_use]
    pub fn operator_id(&self) -> &str {
        self.uas.operator_id().unwrap_or_else(|| self.uas_id())
    }
}

/// Last reported position of a sensor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorPosition {
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lon: Option<f64>,
    /// Height above the ellipsoid in meters.
    #[serde(rename = "altHAE")]
    pub alt_hae: Option<f64>,
    /// Height above mean sea level in meters.
    #[serde(rename = "altMSL")]
    pub alt_msl: Option<f64>,
    /// Altitude of unspecified reference.
    pub alt: Option<f64>,
    /// True track in degrees.
    pub track: Option<f64>,
    /// Magnetic track in degrees.
    pub magtrack: Option<f64>,
    /// Ground speed in m/s.
    pub speed: Option<f64>,
}

impl SensorPosition {
    /// Latitude and longitude, when both are known.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }

    /// Best available altitude, preferring height above the ellipsoid.
    #[must_use]
    pub fn altitude(&self) -> Option<f64> {
        self.alt_hae.or(self.alt).or(self.alt_msl)
    }
}

/// A sensor health report.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorStatus {
    /// Sensor identifier (topic segment 2).
    pub sensor_id: String,
    /// The raw `status` object.
    pub status: Map<String, Value>,
    /// Last known position of the sensor.
    pub position: Option<SensorPosition>,
}

impl SensorStatus {
    /// Sensor hardware model.
    #[must_use]
    pub fn model(&self) -> Option<String> {
        self.status.get("model").and_then(scalar_text)
    }

    /// Free-form sensor state.
    #[must_use]
    pub fn state(&self) -> Option<String> {
        self.status.get("status").and_then(scalar_text)
    }
}

/// Stateful decoder that remembers the last position of every sensor.
#[derive(Debug, Default)]
pub struct SensorDecoder {
    positions: HashMap<String, SensorPosition>,
}

impl SensorDecoder {
    /// Create a decoder with an empty position cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one MQTT publish.
    ///
    /// Objects that fail to decode are logged and skipped; the rest of the
    /// payload is still processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload itself cannot be decoded to text.
    pub fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<Vec<SensorEvent>> {
        let text = decode_payload(payload)?;
        debug!(topic, payload = %text, "Processing sensor payload");

        let mut events = Vec::new();
        for object in split_objects(&text) {
            match self.handle_object(topic, object) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => warn!(topic, error = %err, "Skipping sensor message"),
            }
        }
        Ok(events)
    }

    /// Last cached position of a sensor.
    #[must_use]
    pub fn position(&self, sensor_id: &str) -> Option<&SensorPosition> {
        self.positions.get(sensor_id)
    }

    fn handle_object(&mut self, topic: &str, text: &str) -> Result<Option<SensorEvent>> {
        let Value::Object(object) = serde_json::from_str::<Value>(text)? else {
            return Err(Error::sensor("message is not a JSON object"));
        };

        if topic.contains(POSITION_TOPIC) {
            self.update_position(topic, object)?;
            return Ok(None);
        }
        if object.get("data").is_some_and(is_truthy) {
            let report = parse_detection(topic, &object)?;
            return Ok(Some(SensorEvent::Detection(Box::new(report))));
        }
        if object.get("status").is_some_and(is_truthy) {
            return self.status(topic, object).map(Some);
        }

        debug!(topic, "Ignoring message without data or status");
        Ok(None)
    }

    fn update_position(&mut self, topic: &str, object: Map<String, Value>) -> Result<()> {
        let sensor_id = topic_sensor_id(topic)?;
        let position: SensorPosition = serde_json::from_value(Value::Object(object))?;
        debug!(sensor_id, ?position, "Updated sensor position");
        self.positions.insert(sensor_id.to_string(), position);
        Ok(())
    }

    fn status(&self, topic: &str, mut object: Map<String, Value>) -> Result<SensorEvent> {
        let sensor_id = topic_sensor_id(topic)?;
        let status = match object.remove("status") {
            Some(Value::Object(status)) => status,
            Some(other) => {
                let mut status = Map::new();
                status.insert("status".to_string(), other);
                status
            }
            None => Map::new(),
        };
        info!(sensor_id, "Publishing status for sensor");
        Ok(SensorEvent::Status(SensorStatus {
            sensor_id: sensor_id.to_string(),
            status,
            position: self.positions.get(sensor_id).cloned(),
        }))
    }
}

/// Decode a raw MQTT payload to text.
///
/// Plain UTF-8 is used as is; anything else is treated as xz or legacy LZMA
/// data. One trailing NUL or newline is removed.
///
/// # Errors
///
/// Returns an error for empty payloads and for data that is neither UTF-8
/// nor decompressible.
pub fn decode_payload(payload: &[u8]) -> Result<String> {
    if payload.is_empty() {
        return Err(Error::sensor("empty payload"));
    }

    let mut text = match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => decompress(payload)?,
    };
    if text.ends_with(['\0', '\n']) {
        text.pop();
    }
    Ok(text)
}

fn decompress(payload: &[u8]) -> Result<String> {
    let mut out = Vec::new();
    lzma_rs::xz_decompress(&mut &payload[..], &mut out)
        .or_else(|_| {
            out.clear();
            lzma_rs::lzma_decompress(&mut &payload[..], &mut out)
        })
        .map_err(|e| Error::sensor(format!("payload is neither UTF-8 nor LZMA: {e}")))?;
    String::from_utf8(out)
        .map_err(|e| Error::sensor(format!("decompressed payload is not UTF-8: {e}")))
}

/// Split text holding JSON objects written back to back (`{...}{...}`).
#[must_use]
pub fn split_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut rest = text;
    while let Some(end) = rest.find("}{") {
        objects.push(&rest[..=end]);
        rest = &rest[end + 1..];
    }
    objects.push(rest);
    objects
        .into_iter()
        .map(str::trim)
        .filter(|object| !object.is_empty())
        .collect()
}

fn parse_detection(topic: &str, object: &Map<String, Value>) -> Result<RemoteIdReport> {
    check_protocol(object.get("protocol"))?;

    let data = object
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::sensor("`data` is not an object"))?;
    let encoded = data
        .get("UASdata")
        .and_then(Value::as_str)
        .filter(|encoded| !encoded.is_empty())
        .ok_or_else(|| Error::sensor("no UASdata in message"))?;
    let raw = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::sensor(format!("UASdata is not valid base64: {e}")))?;

    Ok(RemoteIdReport {
        uas: UasData::decode(&raw)?,
        receiver: ReceiverInfo::from_data(data),
        serial: object
            .get("extra")
            .and_then(Value::as_object)
            .and_then(SerialInfo::from_extra),
        topic: topic.to_string(),
    })
}

fn check_protocol(protocol: Option<&Value>) -> Result<()> {
    let version = match protocol {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    if version.as_deref() == Some(SUPPORTED_PROTOCOL) {
        return Ok(());
    }
    Err(Error::sensor(format!(
        "unsupported protocol {}, expected {SUPPORTED_PROTOCOL}",
        protocol.map_or_else(|| "(none)".to_string(), Value::to_string)
    )))
}

fn topic_sensor_id(topic: &str) -> Result<&str> {
    topic
        .split('/')
        .nth(2)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| Error::sensor(format!("no sensor id in topic {topic:?}")))
}

/// Render a JSON scalar as plain text; `null`, arrays and objects give `None`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_one(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.trim() == "1",
        Value::Bool(b) => *b,
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
