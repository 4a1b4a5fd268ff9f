//! Open Drone ID (ASTM F3411 / ASD-STAN 4709-002) payload decoding.
//!
//! Remote ID receivers forward the packed `ODID_UAS_Data` structure of the
//! opendroneid core library, little-endian with natural alignment. This
//! module turns those bytes into typed records.

mod messages;
mod types;

pub use messages::{
    AuthPage, BasicId, HourOffset, Location, OperatorId, SelfId, System, ODID_EPOCH_OFFSET,
};
pub use types::{
    ClassificationType, HeightType, IdType, OperationalStatus, OperatorLocationType, UaType,
};

use messages::Block;

use crate::error::{Error, Result};

/// Minimum size of a packed `UAS_Data` payload.
pub const PAYLOAD_LEN: usize = 914;

/// Number of authentication page slots whose validity flag is read.
pub const AUTH_PAGES: usize = 14;

/// Identifier used when no Basic ID message was received.
pub const UNKNOWN_UAS_ID: &str = "Unknown-BasicID_0";

const BASIC_ID_OFFSET: usize = 0;
const LOCATION_OFFSET: usize = 64;
const AUTH_OFFSET: usize = 136;
const SELF_ID_OFFSET: usize = 776;
const SYSTEM_OFFSET: usize = 808;
const OPERATOR_ID_OFFSET: usize = 864;

const VALID_BASIC_ID: usize = 892;
const VALID_LOCATION: usize = 894;
const VALID_AUTH: usize = 895;
const VALID_SELF_ID: usize = 911;
const VALID_SYSTEM: usize = 912;
const VALID_OPERATOR_ID: usize = 913;

fn check_len(payload: &[u8]) -> Result<()> {
    if payload.len() < PAYLOAD_LEN {
        return Err(Error::odid(format!(
            "payload is {} bytes, expected at least {PAYLOAD_LEN}",
            payload.len()
        )));
    }
    Ok(())
}

fn block(payload: &[u8], offset: usize, size: usize) -> Block<'_> {
    Block::new(&payload[offset..offset + size])
}

/// Which message blocks of a payload carry data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidBlocks {
    /// Basic ID slots 0 and 1.
    pub basic_id: [bool; 2],
    /// Location/vector message.
    pub location: bool,
    /// Authentication pages.
    pub auth: [bool; AUTH_PAGES],
    /// Self ID message.
    pub self_id: bool,
    /// System message.
    pub system: bool,
    /// Operator ID message.
    pub operator_id: bool,
}

impl ValidBlocks {
    /// Read the validity flags of a packed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is shorter than [`PAYLOAD_LEN`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload)?;
        let flag = |offset: usize| payload[offset] == 1;

        let mut auth = [false; AUTH_PAGES];
        for (page, valid) in auth.iter_mut().enumerate() {
            *valid = flag(VALID_AUTH + page);
        }

        Ok(Self {
            basic_id: [flag(VALID_BASIC_ID), flag(VALID_BASIC_ID + 1)],
            location: flag(VALID_LOCATION),
            auth,
            self_id: flag(VALID_SELF_ID),
            system: flag(VALID_SYSTEM),
            operator_id: flag(VALID_OPERATOR_ID),
        })
    }

    /// Whether any block is valid.
    #[must_use]
    pub fn any(&self) -> bool {
        self.basic_id.iter().any(|v| *v)
            || self.location
            || self.auth.iter().any(|v| *v)
            || self.self_id
            || self.system
            || self.operator_id
    }
}

/// A decoded Remote ID report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UasData {
    /// Valid Basic ID messages in slot order.
    pub basic_ids: Vec<BasicId>,
    /// Location/vector message.
    pub location: Option<Location>,
    /// Authentication pages in slot order.
    pub auth_pages: Vec<AuthPage>,
    /// Self ID message.
    pub self_id: Option<SelfId>,
    /// System message.
    pub system: Option<System>,
    /// Operator ID message.
    pub operator_id: Option<OperatorId>,
}

impl UasData {
    /// Decode every valid block of a packed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is shorter than [`PAYLOAD_LEN`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let valid = ValidBlocks::decode(payload)?;

        let basic_ids = valid
            .basic_id
            .iter()
            .enumerate()
            .filter(|(_, valid)| **valid)
            .map(|(slot, _)| {
                let offset = BASIC_ID_OFFSET + slot * BasicId::SIZE;
                BasicId::parse(block(payload, offset, BasicId::SIZE))
            })
            .collect();

        let auth_pages = valid
            .auth
            .iter()
            .enumerate()
            .filter(|(_, valid)| **valid)
            .map(|(slot, _)| {
                let offset = AUTH_OFFSET + slot * AuthPage::SIZE;
                AuthPage::parse(block(payload, offset, AuthPage::SIZE), slot)
            })
            .collect();

        Ok(Self {
            basic_ids,
            location: valid
                .location
                .then(|| Location::parse(block(payload, LOCATION_OFFSET, Location::SIZE))),
            auth_pages,
            self_id: valid
                .self_id
                .then(|| SelfId::parse(block(payload, SELF_ID_OFFSET, SelfId::SIZE))),
            system: valid
                .system
                .then(|| System::parse(block(payload, SYSTEM_OFFSET, System::SIZE))),
            operator_id: valid.operator_id.then(|| {
                OperatorId::parse(block(payload, OPERATOR_ID_OFFSET, OperatorId::SIZE))
            }),
        })
    }

    /// The most recent non-empty Basic ID; later slots win.
    #[must_use]
    pub fn basic_id(&self) -> Option<&BasicId> {
        self.basic_ids
            .iter()
            .rev()
            .find(|basic| !basic.uas_id.is_empty())
    }

    /// The UAS identifier, if any Basic ID carried one.
    #[must_use]
    pub fn uas_id(&self) -> Option<&str> {
        self.basic_id().map(|basic| basic.uas_id.as_str())
    }

    /// The aircraft type from the most recent Basic ID.
    #[must_use]
    pub fn ua_type(&self) -> Option<UaType> {
        self.basic_id().map(|basic| basic.ua_type)
    }

    /// The operator registration number, if present and non-empty.
    #[must_use]
    pub fn operator_id(&self) -> Option<&str> {
        self.operator_id
            .as_ref()
            .map(|op| op.operator_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Reassemble the authentication data from its pages.
    ///
    /// Returns `None` unless page 0 was received.
    #[must_use]
    pub fn auth_data(&self) -> Option<Vec<u8>> {
        let first = self.auth_pages.iter().find(|page| page.length.is_some())?;
        let length = usize::from(first.length.unwrap_or_default());
        let mut data: Vec<u8> = self
            .auth_pages
            .iter()
            .flat_map(|page| page.data.iter().copied())
            .collect();
        data.truncate(length);
        Some(data)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_short_payload_is_rejected() {
        let err = ValidBlocks::decode(&[0u8; 100]).unwrap_err();
        assert!(err.is_decode_error());
        assert!(err.to_string().contains("914"));

        assert!(UasData::decode(&[]).is_err());
    }

    #[test]
    fn test_empty_payload_has_no_blocks() {
        let payload = empty_payload();
        let valid = ValidBlocks::decode(&payload).unwrap();
        assert!(!valid.any());

        let data = UasData::decode(&payload).unwrap();
        assert_eq!(data, UasData::default());
        assert_eq!(data.uas_id(), None);
    }

    #[test]
    fn test_flags_require_exactly_one() {
        let mut payload = empty_payload();
        payload[VALID_LOCATION] = 2;
        payload[VALID_SYSTEM] = 1;
        let valid = ValidBlocks::decode(&payload).unwrap();
        assert!(!valid.location);
        assert!(valid.system);
    }

    #[test]
    fn test_full_payload() {
        let data = UasData::decode(&full_payload()).unwrap();

        assert_eq!(data.uas_id(), Some("1581F5FJD239C00DW22E"));
        assert_eq!(data.ua_type(), Some(UaType::HelicopterOrMultirotor));
        assert_eq!(data.operator_id(), Some("FIN87astrdge12k8"));

        let location = data.location.as_ref().unwrap();
        assert_eq!(location.status, OperationalStatus::Airborne);
        assert_eq!(location.position(), Some((37.7612, -122.4134)));
        assert_eq!(location.altitude_geo, Some(28.0));
        assert_eq!(location.direction, Some(90.0));
        assert_eq!(location.speed_horizontal, Some(12.5));
        assert_eq!(location.horiz_accuracy, 12);
        assert_eq!(location.vert_accuracy, 5);
        assert_eq!(location.timestamp.unwrap().minutes, 12);

        let system = data.system.as_ref().unwrap();
        assert_eq!(system.operator_location_type, OperatorLocationType::LiveGnss);
        assert_eq!(system.operator_position(), Some((37.7608, -122.414)));
        assert_eq!(system.operator_altitude_geo, Some(12.0));
        assert_eq!(system.area_ceiling, None);
        assert!(system.timestamp.is_some());
    }

    #[test]
    fn test_later_basic_id_wins() {
        let mut payload = empty_payload();
        set_basic_id(&mut payload, 0, 2, "FIRST");
        set_basic_id(&mut payload, 1, 1, "SECOND");
        let data = UasData::decode(&payload).unwrap();
        assert_eq!(data.basic_ids.len(), 2);
        assert_eq!(data.uas_id(), Some("SECOND"));
        assert_eq!(data.ua_type(), Some(UaType::Aeroplane));
    }

    #[test]
    fn test_out_of_range_location_values_are_absent() {
        let mut payload = empty_payload();
        set_location(&mut payload, 0.0, 200.0, -1000.0);
        put_f32(&mut payload, LOCATION_OFFSET + 4, 361.0);
        put_f32(&mut payload, LOCATION_OFFSET + 8, 255.0);
        put_f32(&mut payload, LOCATION_OFFSET + 12, -63.0);

        let data = UasData::decode(&payload).unwrap();
        let location = data.location.unwrap();
        assert_eq!(location.latitude, None);
        assert_eq!(location.longitude, None);
        assert_eq!(location.altitude_geo, None);
        assert_eq!(location.direction, None);
        assert_eq!(location.speed_horizontal, None);
        assert_eq!(location.speed_vertical, None);
        assert_eq!(location.position(), None);
    }

    #[test]
    fn test_self_id() {
        let mut payload = empty_payload();
        set_self_id(&mut payload, "Survey flight");
        let data = UasData::decode(&payload).unwrap();
        assert_eq!(data.self_id.unwrap().description, "Survey flight");
    }

    #[test]
    fn test_empty_operator_id_is_none() {
        let mut payload = empty_payload();
        payload[VALID_OPERATOR_ID] = 1;
        let data = UasData::decode(&payload).unwrap();
        assert!(data.operator_id.is_some());
        assert_eq!(data.operator_id(), None);
    }

    #[test]
    fn test_auth_data_assembly() {
        let mut payload = empty_payload();
        set_auth_page(&mut payload, 0, &[0xaa; 17], 20);
        set_auth_page(&mut payload, 1, &[0xbb; 23], 0);

        let data = UasData::decode(&payload).unwrap();
        assert_eq!(data.auth_pages.len(), 2);
        assert_eq!(data.auth_pages[0].last_page_index, Some(1));
        assert_eq!(data.auth_pages[1].length, None);

        let auth = data.auth_data().unwrap();
        assert_eq!(auth.len(), 20);
        assert_eq!(&auth[..17], &[0xaa; 17]);
        assert_eq!(&auth[17..], &[0xbb; 3]);
    }

    #[test]
    fn test_auth_data_requires_first_page() {
        let mut payload = empty_payload();
        set_auth_page(&mut payload, 2, &[0xcc; 23], 0);
        let data = UasData::decode(&payload).unwrap();
        assert_eq!(data.auth_pages.len(), 1);
        assert_eq!(data.auth_data(), None);
    }

    #[test]
    fn test_auth_flags_beyond_thirteen_are_ignored() {
        let mut payload = empty_payload();
        payload[VALID_AUTH + 14] = 1;
        payload[VALID_AUTH + 15] = 1;
        let valid = ValidBlocks::decode(&payload).unwrap();
        assert!(!valid.any());
    }
}
