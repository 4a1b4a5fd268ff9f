//! CoT event model and XML serialization.

use std::io::Write;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;

use super::{cot_time, flow_tag_name, format_number, DEFAULT_HOW, UNKNOWN_VALUE};
use crate::error::{Error, Result};

/// CoT schema version written on every event.
pub const COT_VERSION: &str = "2.0";

/// A generic XML element inside `<detail>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Tag name.
    pub name: String,
    /// Attributes in insertion order.
    pub attributes: Vec<(String, String)>,
    /// Text content.
    pub text: Option<String>,
    /// Child elements.
    pub children: Vec<Element>,
}

impl Element {
    /// Create an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Add an attribute when the value is present.
    #[must_use]
    pub fn attr_opt<V: Into<String>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }

    /// Set the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child element.
    #[must_use]
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Look up an attribute value.
    #[must_use]
    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Find the first direct child with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            return writer
                .write_event(XmlEvent::Empty(start))
                .map_err(encode_error);
        }

        writer
            .write_event(XmlEvent::Start(start))
            .map_err(encode_error)?;
        if let Some(text) = &self.text {
            writer
                .write_event(XmlEvent::Text(BytesText::new(text)))
                .map_err(encode_error)?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(XmlEvent::End(BytesEnd::new(self.name.as_str())))
            .map_err(encode_error)
    }
}

fn encode_error(err: impl std::fmt::Display) -> Error {
    Error::cot_encode(err.to_string())
}

/// The `<point>` of an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Height above the ellipsoid in meters.
    pub hae: Option<f64>,
    /// Circular error.
    pub ce: Option<f64>,
    /// Linear error.
    pub le: Option<f64>,
}

impl Point {
    /// A point with unknown height and error.
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            hae: None,
            ce: None,
            le: None,
        }
    }

    /// Set the height above the ellipsoid.
    #[must_use]
    pub fn with_hae(mut self, hae: Option<f64>) -> Self {
        self.hae = hae;
        self
    }

    /// Set the circular and linear error.
    #[must_use]
    pub fn with_error(mut self, ce: Option<f64>, le: Option<f64>) -> Self {
        self.ce = ce;
        self.le = le;
        self
    }

    fn to_element(self) -> Element {
        let or_unknown =
            |value: Option<f64>| value.map_or_else(|| UNKNOWN_VALUE.to_string(), format_number);
        Element::new("point")
            .attr("lat", format_number(self.lat))
            .attr("lon", format_number(self.lon))
            .attr("hae", or_unknown(self.hae))
            .attr("ce", or_unknown(self.ce))
            .attr("le", or_unknown(self.le))
    }
}

/// A Cursor-on-Target event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique identifier of the tracked entity.
    pub uid: String,
    /// CoT type, e.g. `a-u-A-M-H-Q`.
    pub cot_type: String,
    /// How the position was obtained.
    pub how: String,
    /// Generation time.
    pub time: DateTime<Utc>,
    /// Start of validity.
    pub start: DateTime<Utc>,
    /// End of validity.
    pub stale: DateTime<Utc>,
    /// Access control marking.
    pub access: String,
    /// Position.
    pub point: Point,
    /// Children of `<detail>`.
    pub detail: Vec<Element>,
    /// Value of the `_flow-tags_` attribute name.
    pub flow_tag: String,
}

impl Event {
    /// Create an event valid from now until `now + stale`.
    #[must_use]
    pub fn new(
        uid: impl Into<String>,
        cot_type: impl Into<String>,
        point: Point,
        stale: std::time::Duration,
        host_id: &str,
    ) -> Self {
        let time = Utc::now();
        let stale = chrono::Duration::from_std(stale)
            .ok()
            .and_then(|stale| time.checked_add_signed(stale))
            .unwrap_or(time);
        Self {
            uid: uid.into(),
            cot_type: cot_type.into(),
            how: DEFAULT_HOW.to_string(),
            time,
            start: time,
            stale,
            access: String::new(),
            point,
            detail: Vec::new(),
            flow_tag: flow_tag_name(host_id),
        }
    }

    /// Set the access marking.
    #[must_use]
    pub fn with_access(mut self, access: impl Into<String>) -> Self {
        self.access = access.into();
        self
    }

    /// Append a `<detail>` child.
    #[must_use]
    pub fn with_detail(mut self, element: Element) -> Self {
        self.detail.push(element);
        self
    }

    /// Find a `<detail>` child by name.
    #[must_use]
    pub fn find_detail(&self, name: &str) -> Option<&Element> {
        self.detail.iter().find(|element| element.name == name)
    }

    fn to_element(&self) -> Element {
        let mut detail = Element::new("detail");
        detail.children.extend(self.detail.iter().cloned());
        detail = detail.child(Element::new("_flow-tags_").attr(&self.flow_tag, cot_time(self.time)));

        let mut event = Element::new("event")
            .attr("version", COT_VERSION)
            .attr("type", &self.cot_type)
            .attr("uid", &self.uid)
            .attr("how", &self.how)
            .attr("time", cot_time(self.time))
            .attr("start", cot_time(self.start))
            .attr("stale", cot_time(self.stale));
        if !self.access.is_empty() {
            event = event.attr("access", &self.access);
        }
        event.child(self.point.to_element()).child(detail)
    }

    /// Serialize to an XML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML writer fails.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(encode_error)?;
        writer.get_mut().push(b'\n');
        self.to_element().write(&mut writer)?;
        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample() -> Event {
        Event::new(
            "RID.ABC.uas",
            "a-u-A-M-H-Q",
            Point::new(37.5, -122.25).with_hae(Some(28.0)),
            Duration::from_secs(120),
            "dronecot@test",
        )
        .with_access("Undefined")
        .with_detail(Element::new("contact").attr("callsign", "ABC"))
        .with_detail(Element::new("remarks").with_text("UAS: ABC <1>"))
    }

    #[test]
    fn test_stale_is_offset_from_time() {
        let event = sample();
        assert_eq!(event.stale - event.time, chrono::Duration::seconds(120));
        assert_eq!(event.start, event.time);
        assert_eq!(event.how, "m-g");
    }

    #[test]
    fn test_element_builders() {
        let element = Element::new("track")
            .attr("speed", "0.0")
            .attr_opt("course", None::<String>)
            .attr_opt("extra", Some("1"));
        assert_eq!(element.get_attr("speed"), Some("0.0"));
        assert_eq!(element.get_attr("course"), None);
        assert_eq!(element.get_attr("extra"), Some("1"));
    }

    #[test]
    fn test_to_xml() {
        let xml = String::from_utf8(sample().to_xml().unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<event "));
        assert!(xml.contains(r#"version="2.0""#));
        assert!(xml.contains(r#"uid="RID.ABC.uas""#));
        assert!(xml.contains(r#"access="Undefined""#));
        assert!(xml.contains(r#"<point lat="37.5" lon="-122.25" hae="28.0" ce="9999999.0" le="9999999.0"/>"#));
        assert!(xml.contains(r#"<contact callsign="ABC"/>"#));
        assert!(xml.contains("<remarks>UAS: ABC &lt;1&gt;</remarks>"));
        assert!(xml.contains("<_flow-tags_ dronecot-test-v"));
        assert!(xml.ends_with("</detail></event>"));
    }

    #[test]
    fn test_access_omitted_when_empty() {
        let event = Event::new("x", "a-f-G", Point::new(1.5, 2.5), Duration::from_secs(60), "h");
        let xml = String::from_utf8(event.to_xml().unwrap()).unwrap();
        assert!(!xml.contains("access="));
    }

    #[test]
    fn test_attribute_escaping() {
        let event = sample().with_detail(Element::new("note").attr("text", "a \"quoted\" & b"));
        let xml = String::from_utf8(event.to_xml().unwrap()).unwrap();
        assert!(xml.contains("a &quot;quoted&quot; &amp; b"));
    }
}
