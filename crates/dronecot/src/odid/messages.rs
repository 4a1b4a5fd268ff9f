//! Typed records for the individual Open Drone ID message blocks.
//!
//! Each block is parsed from a fixed-size slice of the packed `UAS_Data`
//! structure. Offsets are relative to the start of the block.

use std::fmt::Write as _;

use chrono::{DateTime, TimeZone, Utc};

use super::types::{
    ClassificationType, HeightType, IdType, OperationalStatus, OperatorLocationType, UaType,
};

/// Seconds between the Unix epoch and 2019-01-01T00:00:00Z, the Open Drone ID epoch.
pub const ODID_EPOCH_OFFSET: i64 = 1_546_300_800;

/// Altitudes at or below this value mean "unknown".
const ALTITUDE_MIN: f64 = -1000.0;

/// Largest encodable altitude.
const ALTITUDE_MAX: f64 = 31767.5;

/// Largest encodable horizontal speed in m/s.
const SPEED_HORIZONTAL_MAX: f64 = 254.25;

/// Largest encodable vertical speed magnitude in m/s.
const SPEED_VERTICAL_MAX: f64 = 62.0;

/// Little-endian field reader over one block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block<'a> {
    bytes: &'a [u8],
}

impl<'a> Block<'a> {
    /// Wrap a block slice. Callers guarantee the slice covers every offset read.
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[offset..offset + N]);
        out
    }

    pub(crate) fn u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    fn u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.array(offset))
    }

    fn u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.array(offset))
    }

    /// Read an `f32` and widen it to the shortest `f64` with the same decimal form.
    fn f32(&self, offset: usize) -> f64 {
        widen(f32::from_le_bytes(self.array(offset)))
    }

    fn f64(&self, offset: usize) -> f64 {
        f64::from_le_bytes(self.array(offset))
    }

    fn bytes(&self, offset: usize, len: usize) -> &'a [u8] {
        &self.bytes[offset..offset + len]
    }

    fn text(&self, offset: usize, len: usize) -> String {
        String::from_utf8_lossy(self.bytes(offset, len))
            .trim_end_matches('\0')
            .to_string()
    }
}

/// Convert an `f32` to `f64` without exposing binary noise (`12.3` stays `12.3`).
fn widen(value: f32) -> f64 {
    if !value.is_finite() {
        return f64::from(value);
    }
    value
        .to_string()
        .parse()
        .unwrap_or_else(|_| f64::from(value))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn within(value: f64, min: f64, max: f64) -> Option<f64> {
    (value.is_finite() && value >= min && value <= max).then_some(value)
}

fn coordinate(value: f64, limit: f64) -> Option<f64> {
    // A zero coordinate is what transmitters send before they have a fix.
    (value.is_finite() && value != 0.0 && value.abs() <= limit).then_some(value)
}

fn altitude(value: f64) -> Option<f64> {
    (value.is_finite() && value > ALTITUDE_MIN && value <= ALTITUDE_MAX).then_some(value)
}

fn odid_timestamp(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    Utc.timestamp_opt(ODID_EPOCH_OFFSET + i64::from(seconds), 0)
        .single()
}

/// Basic ID message: what the aircraft is and who it claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicId {
    /// Kind of aircraft.
    pub ua_type: UaType,
    /// Format of `uas_id`.
    pub id_type: IdType,
    /// The identifier. Non-textual identifiers are rendered as lowercase hex.
    pub uas_id: String,
}

impl BasicId {
    pub(crate) const SIZE: usize = 32;

    pub(crate) fn parse(block: Block<'_>) -> Self {
        let id_type = IdType::from(block.u32(4));
        let uas_id = if id_type.is_textual() {
            block.text(8, 21)
        } else {
            hex(block.bytes(8, 21))
        };
        Self {
            ua_type: UaType::from(block.u32(0)),
            id_type,
            uas_id,
        }
    }
}

/// Time of a Location message, relative to the start of the current hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourOffset {
    /// Whole minutes after the hour.
    pub minutes: u32,
    /// Whole seconds after the minute.
    pub seconds: u32,
    /// Hundredths of a second.
    pub centiseconds: u32,
}

impl HourOffset {
    /// Split seconds-after-the-hour; `None` outside `(0, 3600]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_seconds(total: f64) -> Option<Self> {
        if !(total > 0.0 && total <= 3600.0) {
            return None;
        }
        Some(Self {
            minutes: (total / 60.0) as u32,
            seconds: (total % 60.0) as u32,
            centiseconds: ((total.fract() * 100.0).round() as u32).min(99),
        })
    }
}

/// Location/vector message.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Operational status.
    pub status: OperationalStatus,
    /// Track direction in degrees clockwise from true north.
    pub direction: Option<f64>,
    /// Ground speed in m/s.
    pub speed_horizontal: Option<f64>,
    /// Vertical speed in m/s, up is positive.
    pub speed_vertical: Option<f64>,
    /// WGS-84 latitude.
    pub latitude: Option<f64>,
    /// WGS-84 longitude.
    pub longitude: Option<f64>,
    /// Barometric pressure altitude in meters.
    pub altitude_baro: Option<f64>,
    /// Geodetic (WGS-84 HAE) altitude in meters.
    pub altitude_geo: Option<f64>,
    /// Reference for `height`.
    pub height_type: HeightType,
    /// Height in meters.
    pub height: Option<f64>,
    /// Horizontal accuracy code.
    pub horiz_accuracy: u32,
    /// Vertical accuracy code.
    pub vert_accuracy: u32,
    /// Barometric altitude accuracy code.
    pub baro_accuracy: u32,
    /// Speed accuracy code.
    pub speed_accuracy: u32,
    /// Timestamp accuracy code.
    pub ts_accuracy: u32,
    /// Time of the report within the current hour.
    pub timestamp: Option<HourOffset>,
}

impl Location {
    pub(crate) const SIZE: usize = 72;

    pub(crate) fn parse(block: Block<'_>) -> Self {
        Self {
            status: OperationalStatus::from(block.u32(0)),
            direction: within(block.f32(4), 0.0, 360.0),
            speed_horizontal: within(block.f32(8), 0.0, SPEED_HORIZONTAL_MAX),
            speed_vertical: within(block.f32(12), -SPEED_VERTICAL_MAX, SPEED_VERTICAL_MAX),
            latitude: coordinate(block.f64(16), 90.0),
            longitude: coordinate(block.f64(24), 180.0),
            altitude_baro: altitude(block.f32(32)),
            altitude_geo: altitude(block.f32(36)),
            height_type: HeightType::from(block.u32(40)),
            height: altitude(block.f32(44)),
            horiz_accuracy: block.u32(48),
            vert_accuracy: block.u32(52),
            baro_accuracy: block.u32(56),
            speed_accuracy: block.u32(60),
            ts_accuracy: block.u32(64),
            timestamp: HourOffset::from_seconds(block.f32(68)),
        }
    }

    /// Latitude and longitude, when both are known.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// One page of an Authentication message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPage {
    /// Page number as transmitted.
    pub page_number: u8,
    /// Authentication scheme.
    pub auth_type: u8,
    /// Index of the last page (page 0 only).
    pub last_page_index: Option<u8>,
    /// Total authentication data length in bytes (page 0 only).
    pub length: Option<u8>,
    /// Signature time (page 0 only).
    pub timestamp: Option<DateTime<Utc>>,
    /// Data bytes carried by this page.
    pub data: Vec<u8>,
}

impl AuthPage {
    pub(crate) const SIZE: usize = 40;
    const FIRST_PAGE_DATA: usize = 17;
    const PAGE_DATA: usize = 23;

    pub(crate) fn parse(block: Block<'_>, slot: usize) -> Self {
        if slot == 0 {
            Self {
                page_number: block.u8(0),
                auth_type: block.u8(4),
                last_page_index: Some(block.u8(8)),
                length: Some(block.u8(9)),
                timestamp: odid_timestamp(block.u32(12)),
                data: block.bytes(16, Self::FIRST_PAGE_DATA).to_vec(),
            }
        } else {
            Self {
                page_number: block.u8(0),
                auth_type: block.u8(4),
                last_page_index: None,
                length: None,
                timestamp: None,
                data: block.bytes(16, Self::PAGE_DATA).to_vec(),
            }
        }
    }
}

/// Self ID message: free-text description of the flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfId {
    /// Description type.
    pub desc_type: u32,
    /// Description text.
    pub description: String,
}

impl SelfId {
    pub(crate) const SIZE: usize = 32;

    pub(crate) fn parse(block: Block<'_>) -> Self {
        Self {
            desc_type: block.u32(0),
            description: block.text(4, 23),
        }
    }
}

/// System message: operator position and operating area.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    /// Source of the operator position.
    pub operator_location_type: OperatorLocationType,
    /// Classification scheme.
    pub classification_type: ClassificationType,
    /// Operator latitude.
    pub operator_latitude: Option<f64>,
    /// Operator longitude.
    pub operator_longitude: Option<f64>,
    /// Number of aircraft in the area.
    pub area_count: u16,
    /// Radius of the area in meters.
    pub area_radius: u16,
    /// Area ceiling in meters.
    pub area_ceiling: Option<f64>,
    /// Area floor in meters.
    pub area_floor: Option<f64>,
    /// EU category.
    pub category_eu: u32,
    /// EU class.
    pub class_eu: u32,
    /// Operator geodetic altitude in meters.
    pub operator_altitude_geo: Option<f64>,
    /// Time of the message.
    pub timestamp: Option<DateTime<Utc>>,
}

impl System {
    pub(crate) const SIZE: usize = 56;

    pub(crate) fn parse(block: Block<'_>) -> Self {
        let area_limit = |value: f64| (value != ALTITUDE_MIN).then_some(value);
        Self {
            operator_location_type: OperatorLocationType::from(block.u32(0)),
            classification_type: ClassificationType::from(block.u32(4)),
            operator_latitude: coordinate(block.f64(8), 90.0),
            operator_longitude: coordinate(block.f64(16), 180.0),
            area_count: block.u16(24),
            area_radius: block.u16(26),
            area_ceiling: area_limit(block.f32(28)),
            area_floor: area_limit(block.f32(32)),
            category_eu: block.u32(36),
            class_eu: block.u32(40),
            operator_altitude_geo: altitude(block.f32(44)),
            timestamp: odid_timestamp(block.u32(48)),
        }
    }

    /// Operator latitude and longitude, when both are known.
    #[must_use]
    pub fn operator_position(&self) -> Option<(f64, f64)> {
        Some((self.operator_latitude?, self.operator_longitude?))
    }
}

/// Operator ID message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorId {
    /// Operator ID type.
    pub id_type: u32,
    /// Operator registration number.
    pub operator_id: String,
}

impl OperatorId {
    pub(crate) const SIZE: usize = 28;

    pub(crate) fn parse(block: Block<'_>) -> Self {
        Self {
            id_type: block.u32(0),
            operator_id: block.text(4, 20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_keeps_decimal_form() {
        assert_eq!(widen(12.3), 12.3);
        assert_eq!(widen(28.0), 28.0);
        assert!(widen(f32::NAN).is_nan());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }

    #[test]
    fn test_coordinate_rejects_zero_and_out_of_range() {
        assert_eq!(coordinate(0.0, 90.0), None);
        assert_eq!(coordinate(91.0, 90.0), None);
        assert_eq!(coordinate(-180.5, 180.0), None);
        assert_eq!(coordinate(f64::NAN, 90.0), None);
        assert_eq!(coordinate(37.76, 90.0), Some(37.76));
    }

    #[test]
    fn test_altitude_limits() {
        assert_eq!(altitude(-1000.0), None);
        assert_eq!(altitude(31768.0), None);
        assert_eq!(altitude(31767.5), Some(31767.5));
        assert_eq!(altitude(-999.5), Some(-999.5));
    }

    #[test]
    fn test_hour_offset() {
        let offset = HourOffset::from_seconds(754.5).unwrap();
        assert_eq!(offset.minutes, 12);
        assert_eq!(offset.seconds, 34);
        assert_eq!(offset.centiseconds, 50);

        assert!(HourOffset::from_seconds(0.0).is_none());
        assert!(HourOffset::from_seconds(3600.5).is_none());
        assert!(HourOffset::from_seconds(f64::NAN).is_none());
    }

    #[test]
    fn test_odid_timestamp() {
        assert!(odid_timestamp(0).is_none());
        let ts = odid_timestamp(86_400).unwrap();
        assert_eq!(ts.to_rfc3339(), "2019-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_basic_id_textual_and_hex() {
        let mut raw = [0u8; BasicId::SIZE];
        raw[0] = 2;
        raw[4] = 1;
        raw[8..14].copy_from_slice(b"ABC123");
        let basic = BasicId::parse(Block::new(&raw));
        assert_eq!(basic.ua_type, UaType::HelicopterOrMultirotor);
        assert_eq!(basic.uas_id, "ABC123");

        raw[4] = 3;
        let basic = BasicId::parse(Block::new(&raw));
        assert_eq!(basic.id_type, IdType::UtmAssignedUuid);
        assert_eq!(basic.uas_id.len(), 42);
        assert!(basic.uas_id.starts_with("414243313233"));
    }

    #[test]
    fn test_system_area_sentinel() {
        let mut raw = [0u8; System::SIZE];
        raw[28..32].copy_from_slice(&(-1000.0f32).to_le_bytes());
        raw[32..36].copy_from_slice(&(20.0f32).to_le_bytes());
        let system = System::parse(Block::new(&raw));
        assert_eq!(system.area_ceiling, None);
        assert_eq!(system.area_floor, Some(20.0));
        assert_eq!(system.operator_position(), None);
    }
}
