//! Builders for the aircraft, operator and sensor events.

use chrono::Utc;

use super::{cot_time, format_number, CotSettings, Element, Event, Point};
use super::{UAS_COT_TYPE_FIXED_WING, UAS_COT_TYPE_ROTARY};
use crate::gps::GpsFix;
use crate::sensor::{RemoteIdReport, SensorStatus};

/// CoT type of the link from an aircraft to its operator.
const LINK_TYPE: &str = "a-n-G";

/// Parent/child relation of the aircraft-to-operator link.
const LINK_RELATION: &str = "p-p";

fn uas_uid(uas_id: &str) -> String {
    format!("RID.{uas_id}.uas")
}

fn operator_uid(uas_id: &str) -> String {
    format!("RID.{uas_id}.op")
}

/// Accuracy codes are written as is; code 0 means unknown.
fn accuracy(code: u32) -> Option<f64> {
    (code != 0).then(|| f64::from(code))
}

fn remarks(fields: &[String]) -> Element {
    let text = fields
        .iter()
        .filter(|field| !field.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    Element::new("remarks").with_text(text)
}

/// Render the aircraft of a detection.
///
/// Returns `None` when the report carries no usable aircraft position.
#[must_use]
pub fn uas_event(report: &RemoteIdReport, settings: &CotSettings) -> Option<Event> {
    let location = report.uas.location.as_ref()?;
    let (lat, lon) = location.position()?;

    let uas_id = report.uas_id();
    let op_id = report.operator_id();
    let cot_type = settings.uas_cot_type.clone().unwrap_or_else(|| {
        match report.uas.ua_type() {
            Some(ua_type) if ua_type.is_fixed_wing() => UAS_COT_TYPE_FIXED_WING,
            _ => UAS_COT_TYPE_ROTARY,
        }
        .to_string()
    });

    let point = Point::new(lat, lon)
        .with_hae(location.altitude_geo)
        .with_error(
            accuracy(location.horiz_accuracy),
            accuracy(location.vert_accuracy),
        );

    let track = Element::new("track")
        .attr(
            "speed",
            format_number(location.speed_horizontal.unwrap_or_default()),
        )
        .attr_opt("course", location.direction.map(format_number));

    let link = Element::new("link")
        .attr("uid", operator_uid(uas_id))
        .attr("production_time", cot_time(Utc::now()))
        .attr("type", LINK_TYPE)
        .attr("parent_callsign", op_id)
        .attr("relation", LINK_RELATION);

    let receiver = &report.receiver;
    let cuas = Element::new("__cuas")
        .attr(
            "sensor_id",
            receiver
                .sensor_id
                .clone()
                .unwrap_or_else(|| settings.sensor_id.clone()),
        )
        .attr_opt("rssi", receiver.rssi.clone())
        .attr_opt("channel", receiver.channel.clone())
        .attr_opt("timestamp", receiver.timestamp.clone())
        .attr_opt("mac_address", receiver.mac_address.clone())
        .attr(
            "type",
            receiver
                .payload_type
                .clone()
                .unwrap_or_else(|| settings.sensor_payload_type.clone()),
        )
        .attr("host_id", &settings.host_id)
        .attr("rid_op", op_id)
        .attr("rid_uas", uas_id);

    let description = report
        .serial
        .as_ref()
        .and_then(|serial| serial.describe())
        .unwrap_or_default();

    Some(
        Event::new(
            uas_uid(uas_id),
            cot_type,
            point,
            settings.stale,
            &settings.host_id,
        )
        .with_access(&settings.access)
        .with_detail(Element::new("contact").attr("callsign", uas_id))
        .with_detail(track)
        .with_detail(link)
        .with_detail(cuas)
        .with_detail(remarks(&[
            format!("UAS: {uas_id}"),
            format!("Operator: {op_id}"),
            description,
            settings.host_id.clone(),
        ])),
    )
}

/// Render the operator of a detection.
///
/// Returns `None` when the report carries no usable operator position.
#[must_use]
pub fn operator_event(report: &RemoteIdReport, settings: &CotSettings) -> Option<Event> {
    let system = report.uas.system.as_ref()?;
    let (lat, lon) = system.operator_position()?;

    let uas_id = report.uas_id();
    let op_id = report.operator_id();

    let (ce, le) = report.uas.location.as_ref().map_or((None, None), |location| {
        (
            accuracy(location.horiz_accuracy),
            accuracy(location.vert_accuracy),
        )
    });
    let point = Point::new(lat, lon)
        .with_hae(system.operator_altitude_geo)
        .with_error(ce, le);

    let cuas = Element::new("__cuas")
        .attr("cot_host_id", &settings.host_id)
        .attr("OperatorID", op_id)
        .attr("UASID", uas_id);

    Some(
        Event::new(
            operator_uid(uas_id),
            &settings.op_cot_type,
            point,
            settings.stale,
            &settings.host_id,
        )
        .with_access(&settings.access)
        .with_detail(Element::new("contact").attr("callsign", op_id))
        .with_detail(cuas)
        .with_detail(remarks(&[
            format!("UAS ID={uas_id} OperatorID={op_id}"),
            settings.host_id.clone(),
        ])),
    )
}

/// Render a sensor status report.
///
/// The position comes from the sensor's own position updates, then from the
/// configured sensor location, then from `fix`. Without any, there is no
/// event.
#[must_use]
pub fn sensor_status_event(
    status: &SensorStatus,
    settings: &CotSettings,
    fix: Option<&GpsFix>,
) -> Option<Event> {
    let reported = status.position.as_ref().and_then(|position| {
        let (lat, lon) = position.coordinates()?;
        Some(Point::new(lat, lon).with_hae(position.altitude()))
    });
    let configured = settings
        .sensor_position
        .map(|position| Point::new(position.lat, position.lon).with_hae(position.alt));
    let point = reported
        .or(configured)
        .or_else(|| fix.and_then(GpsFix::point))?;

    let sensor_id = status.sensor_id.as_str();
    let speed = status
        .position
        .as_ref()
        .and_then(|position| position.speed)
        .unwrap_or_default();

    let info = [status.model(), status.state()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let headline = if info.is_empty() {
        format!("C-UAS Sensor {sensor_id}")
    } else {
        format!("C-UAS Sensor {sensor_id} - {info}")
    };

    Some(
        Event::new(
            format!("CUAS.{sensor_id}"),
            &settings.sensor_cot_type,
            point,
            settings.stale,
            &settings.host_id,
        )
        .with_access(&settings.access)
        .with_detail(Element::new("contact").attr("callsign", sensor_id))
        .with_detail(Element::new("track").attr("speed", format_number(speed)))
        .with_detail(
            Element::new("_dronecot_")
                .attr("cot_host_id", &settings.host_id)
                .attr("sensor_id", sensor_id),
        )
        .with_detail(remarks(&[headline, settings.host_id.clone()])),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cot::FixedPosition;
    use crate::odid::testing::{empty_payload, full_payload, set_basic_id, set_location};
    use crate::odid::UasData;
    use crate::sensor::{ReceiverInfo, SensorPosition, SerialInfo};
    use serde_json::{json, Map, Value};

    fn report(payload: &[u8]) -> RemoteIdReport {
        RemoteIdReport {
            uas: UasData::decode(payload).unwrap(),
            receiver: ReceiverInfo {
                sensor_id: Some("sensor-1".to_string()),
                rssi: Some("-85".to_string()),
                ..ReceiverInfo::default()
            },
            serial: None,
            topic: "ctl/rid/sensor-1/detection".to_string(),
        }
    }

    fn settings() -> CotSettings {
        CotSettings {
            host_id: "dronecot@test".to_string(),
            ..CotSettings::default()
        }
    }

    fn status(position: Option<SensorPosition>) -> SensorStatus {
        let Value::Object(map) = json!({"model": "RID-1", "status": "online"}) else {
            unreachable!()
        };
        SensorStatus {
            sensor_id: "sensor-7".to_string(),
            status: map,
            position,
        }
    }

    #[test]
    fn test_uas_event() {
        let event = uas_event(&report(&full_payload()), &settings()).unwrap();

        assert_eq!(event.uid, "RID.1581F5FJD239C00DW22E.uas");
        assert_eq!(event.cot_type, UAS_COT_TYPE_ROTARY);
        assert_eq!(event.access, "Undefined");
        assert_eq!(event.point.lat, 37.7612);
        assert_eq!(event.point.hae, Some(28.0));
        assert_eq!(event.point.ce, Some(12.0));
        assert_eq!(event.point.le, Some(5.0));

        let contact = event.find_detail("contact").unwrap();
        assert_eq!(contact.get_attr("callsign"), Some("1581F5FJD239C00DW22E"));

        let track = event.find_detail("track").unwrap();
        assert_eq!(track.get_attr("speed"), Some("12.5"));
        assert_eq!(track.get_attr("course"), Some("90.0"));

        let link = event.find_detail("link").unwrap();
        assert_eq!(link.get_attr("uid"), Some("RID.1581F5FJD239C00DW22E.op"));
        assert_eq!(link.get_attr("parent_callsign"), Some("FIN87astrdge12k8"));
        assert_eq!(link.get_attr("relation"), Some("p-p"));

        let cuas = event.find_detail("__cuas").unwrap();
        assert_eq!(cuas.get_attr("sensor_id"), Some("sensor-1"));
        assert_eq!(cuas.get_attr("rssi"), Some("-85"));
        assert_eq!(cuas.get_attr("channel"), None);
        assert_eq!(cuas.get_attr("type"), Some("Unknown-Sensor-Payload-Type"));
        assert_eq!(cuas.get_attr("rid_op"), Some("FIN87astrdge12k8"));

        let remarks = event.find_detail("remarks").unwrap();
        assert_eq!(
            remarks.text.as_deref(),
            Some("UAS: 1581F5FJD239C00DW22E Operator: FIN87astrdge12k8 dronecot@test")
        );
    }

    #[test]
    fn test_uas_event_type_selection() {
        let mut payload = full_payload();
        set_basic_id(&mut payload, 0, 1, "1581F5FJD239C00DW22E");
        let event = uas_event(&report(&payload), &settings()).unwrap();
        assert_eq!(event.cot_type, UAS_COT_TYPE_FIXED_WING);

        let configured = CotSettings {
            uas_cot_type: Some("a-f-A-M-H-Q".to_string()),
            ..settings()
        };
        let event = uas_event(&report(&payload), &configured).unwrap();
        assert_eq!(event.cot_type, "a-f-A-M-H-Q");
    }

    #[test]
    fn test_uas_event_with_serial_description() {
        let mut report = report(&full_payload());
        report.serial = Some(SerialInfo {
            manufacturer: Some("DJI".to_string()),
            model: Some("Mavic 3".to_string()),
            ..SerialInfo::default()
        });
        let event = uas_event(&report, &settings()).unwrap();
        let text = event.find_detail("remarks").unwrap().text.clone().unwrap();
        assert!(text.contains("FIN87astrdge12k8 DJI Mavic 3 dronecot@test"));
    }

    #[test]
    fn test_uas_event_requires_position() {
        let mut payload = empty_payload();
        set_basic_id(&mut payload, 0, 2, "NOFIX");
        assert!(uas_event(&report(&payload), &settings()).is_none());

        set_location(&mut payload, 0.0, 0.0, 10.0);
        assert!(uas_event(&report(&payload), &settings()).is_none());
    }

    #[test]
    fn test_uas_event_unknown_ids() {
        let mut payload = empty_payload();
        set_location(&mut payload, 37.5, -122.5, 10.0);
        let event = uas_event(&report(&payload), &settings()).unwrap();
        assert_eq!(event.uid, "RID.Unknown-BasicID_0.uas");
        let link = event.find_detail("link").unwrap();
        assert_eq!(link.get_attr("parent_callsign"), Some("Unknown-BasicID_0"));
    }

    #[test]
    fn test_operator_event() {
        let event = operator_event(&report(&full_payload()), &settings()).unwrap();

        assert_eq!(event.uid, "RID.1581F5FJD239C00DW22E.op");
        assert_eq!(event.cot_type, "a-u-G");
        assert_eq!(event.point.lat, 37.7608);
        assert_eq!(event.point.hae, Some(12.0));

        let contact = event.find_detail("contact").unwrap();
        assert_eq!(contact.get_attr("callsign"), Some("FIN87astrdge12k8"));
        let cuas = event.find_detail("__cuas").unwrap();
        assert_eq!(cuas.get_attr("OperatorID"), Some("FIN87astrdge12k8"));
        assert_eq!(cuas.get_attr("UASID"), Some("1581F5FJD239C00DW22E"));
        assert_eq!(
            event.find_detail("remarks").unwrap().text.as_deref(),
            Some("UAS ID=1581F5FJD239C00DW22E OperatorID=FIN87astrdge12k8 dronecot@test")
        );
    }

    #[test]
    fn test_operator_event_requires_system() {
        let mut payload = empty_payload();
        set_location(&mut payload, 37.5, -122.5, 10.0);
        assert!(operator_event(&report(&payload), &settings()).is_none());
    }

    #[test]
    fn test_operator_and_link_agree() {
        let report = report(&full_payload());
        let uas = uas_event(&report, &settings()).unwrap();
        let op = operator_event(&report, &settings()).unwrap();
        assert_eq!(uas.find_detail("link").unwrap().get_attr("uid"), Some(op.uid.as_str()));
    }

    #[test]
    fn test_sensor_status_from_reported_position() {
        let position = SensorPosition {
            lat: Some(37.76),
            lon: Some(-122.41),
            alt_hae: Some(20.5),
            speed: Some(1.5),
            ..SensorPosition::default()
        };
        let event = sensor_status_event(&status(Some(position)), &settings(), None).unwrap();

        assert_eq!(event.uid, "CUAS.sensor-7");
        assert_eq!(event.cot_type, "a-f-G-E-S-E");
        assert_eq!(event.point.lat, 37.76);
        assert_eq!(event.point.hae, Some(20.5));
        assert_eq!(
            event.find_detail("track").unwrap().get_attr("speed"),
            Some("1.5")
        );
        let marker = event.find_detail("_dronecot_").unwrap();
        assert_eq!(marker.get_attr("sensor_id"), Some("sensor-7"));
        assert_eq!(
            event.find_detail("remarks").unwrap().text.as_deref(),
            Some("C-UAS Sensor sensor-7 - RID-1 online dronecot@test")
        );
    }

    #[test]
    fn test_sensor_status_falls_back_to_configured_position() {
        let settings = CotSettings {
            sensor_position: Some(FixedPosition {
                lat: 40.0,
                lon: -105.0,
                alt: Some(1600.0),
            }),
            ..settings()
        };
        let event = sensor_status_event(&status(None), &settings, None).unwrap();
        assert_eq!(event.point.lat, 40.0);
        assert_eq!(event.point.hae, Some(1600.0));
    }

    #[test]
    fn test_sensor_status_falls_back_to_gps() {
        let fix: GpsFix =
            serde_json::from_str(r#"{"class":"TPV","lat":51.5,"lon":-0.12,"altHAE":45.0}"#)
                .unwrap();
        let event = sensor_status_event(&status(None), &settings(), Some(&fix)).unwrap();
        assert_eq!(event.point.lat, 51.5);
        assert_eq!(event.point.hae, Some(45.0));
    }

    #[test]
    fn test_sensor_status_without_position() {
        assert!(sensor_status_event(&status(None), &settings(), None).is_none());
    }

    #[test]
    fn test_sensor_status_without_model() {
        let status = SensorStatus {
            sensor_id: "s".to_string(),
            status: Map::new(),
            position: Some(SensorPosition {
                lat: Some(1.5),
                lon: Some(2.5),
                ..SensorPosition::default()
            }),
        };
        let event = sensor_status_event(&status, &settings(), None).unwrap();
        assert_eq!(
            event.find_detail("remarks").unwrap().text.as_deref(),
            Some("C-UAS Sensor s dronecot@test")
        );
    }
}
