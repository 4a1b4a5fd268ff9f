//! Cursor-on-Target rendering.
//!
//! [`Event`] is the generic CoT event model. The functions in this module
//! build the three events the gateway produces: the aircraft, its operator,
//! and the receiving sensor.

mod event;
mod rid;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use event::{Element, Event, Point, COT_VERSION};
pub use rid::{operator_event, sensor_status_event, uas_event};

/// Value written for unknown `hae`, `ce` and `le`.
pub const UNKNOWN_VALUE: &str = "9999999.0";

/// How positions are obtained: machine, GPS derived.
pub const DEFAULT_HOW: &str = "m-g";

/// Default stale time in seconds.
pub const DEFAULT_COT_STALE: u64 = 120;

/// Default access marking.
pub const DEFAULT_COT_ACCESS: &str = "Undefined";

/// CoT type for rotorcraft and other non fixed-wing aircraft.
pub const UAS_COT_TYPE_ROTARY: &str = "a-u-A-M-H-Q";

/// CoT type for fixed-wing aircraft.
pub const UAS_COT_TYPE_FIXED_WING: &str = "a-u-A-M-F-Q";

/// Default CoT type for operators.
pub const DEFAULT_OP_COT_TYPE: &str = "a-u-G";

/// Default CoT type for sensors.
pub const DEFAULT_SENSOR_COT_TYPE: &str = "a-f-G-E-S-E";

/// Default sensor payload type reported in `__cuas`.
pub const DEFAULT_SENSOR_PAYLOAD_TYPE: &str = "Unknown-Sensor-Payload-Type";

/// A fixed sensor location from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPosition {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Height above the ellipsoid.
    pub alt: Option<f64>,
}

/// Everything the renderers need from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CotSettings {
    /// Identity of this gateway instance.
    pub host_id: String,
    /// Lifetime of each event.
    pub stale: Duration,
    /// Access marking.
    pub access: String,
    /// Fixed CoT type for aircraft; derived from the UA type when unset.
    pub uas_cot_type: Option<String>,
    /// CoT type for operators.
    pub op_cot_type: String,
    /// CoT type for sensors.
    pub sensor_cot_type: String,
    /// Sensor identifier used when a detection does not name one.
    pub sensor_id: String,
    /// Payload type used when a detection does not name one.
    pub sensor_payload_type: String,
    /// Configured sensor location.
    pub sensor_position: Option<FixedPosition>,
}

impl Default for CotSettings {
    fn default() -> Self {
        Self {
            host_id: "dronecot".to_string(),
            stale: Duration::from_secs(DEFAULT_COT_STALE),
            access: DEFAULT_COT_ACCESS.to_string(),
            uas_cot_type: None,
            op_cot_type: DEFAULT_OP_COT_TYPE.to_string(),
            sensor_cot_type: DEFAULT_SENSOR_COT_TYPE.to_string(),
            sensor_id: "dronecot".to_string(),
            sensor_payload_type: DEFAULT_SENSOR_PAYLOAD_TYPE.to_string(),
            sensor_position: None,
        }
    }
}

/// Format a CoT timestamp: `2024-05-01T12:00:00.000000Z`.
#[must_use]
pub fn cot_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Format a number the way CoT consumers expect: `28.0`, `37.7612`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Attribute name for `_flow-tags_`: `<host-id>-v<version>` as a valid XML name.
#[must_use]
pub fn flow_tag_name(host_id: &str) -> String {
    let raw = format!("{host_id}-v{}", env!("CARGO_PKG_VERSION"));
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cot_time() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 7).unwrap();
        assert_eq!(cot_time(time), "2024-05-01T12:00:07.000000Z");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(28.0), "28.0");
        assert_eq!(format_number(-122.4134), "-122.4134");
        assert_eq!(format_number(0.0), "0.0");
        assert_eq!(format_number(12.5), "12.5");
    }

    #[test]
    fn test_flow_tag_name() {
        let name = flow_tag_name("dronecot@host");
        assert!(name.starts_with("dronecot-host-v"));
        assert!(!name.contains('@'));

        assert!(flow_tag_name("1host").starts_with("_1host-v"));
    }

    #[test]
    fn test_default_settings() {
        let settings = CotSettings::default();
        assert_eq!(settings.stale, Duration::from_secs(120));
        assert_eq!(settings.op_cot_type, "a-u-G");
        assert_eq!(settings.sensor_cot_type, "a-f-G-E-S-E");
        assert!(settings.uas_cot_type.is_none());
    }
}
