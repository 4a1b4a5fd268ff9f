//! TAK connection preference packages.
//!
//! A preference package is the zip "data package" TAK servers hand out to
//! enroll a client. It holds a `*.pref` XML file naming the server and the
//! PKCS#12 bundles for the client identity and the server trust store.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::tak::{CotUrl, TlsIdentity};

/// Password TAK servers use for generated certificate bundles.
pub const DEFAULT_CERT_PASSWORD: &str = "atakatak";

const CONNECT_STRING: &str = "connectString0";
const CA_LOCATION: &str = "caLocation";
const CA_PASSWORD: &str = "caPassword";
const CERT_LOCATION: &str = "certificateLocation";
const CLIENT_PASSWORD: &str = "clientPassword";

/// Connection settings read from a preference package.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefPackage {
    /// Destination from `connectString0`.
    pub cot_url: CotUrl,
    /// Client identity for TLS destinations.
    pub identity: Option<TlsIdentity>,
}

impl PrefPackage {
    /// Read a preference package from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not a zip archive, has no `.pref`
    /// file or `connectString0`, or references certificates it does not
    /// contain.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::pref_package(path, e.to_string()))?;
        let package =
            Self::from_reader(file).map_err(|err| Error::pref_package(path, err.to_string()))?;
        info!(
            path = %path.display(),
            cot_url = %package.cot_url,
            "Loaded preference package"
        );
        Ok(package)
    }

    fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();

        let pref_name = names
            .iter()
            .find(|name| name.to_ascii_lowercase().ends_with(".pref"))
            .ok_or_else(|| Error::package("no .pref file in package"))?;
        let pref = read_entry(&mut archive, pref_name)?;
        let entries = parse_entries(&String::from_utf8_lossy(&pref))?;
        debug!(keys = ?entries.keys().collect::<Vec<_>>(), "Preference entries");

        let connect = entries
            .get(CONNECT_STRING)
            .ok_or_else(|| Error::package(format!("no {CONNECT_STRING} entry")))?;
        let cot_url = parse_connect_string(connect)?;

        let identity = if cot_url.is_tls() {
            let password = |key: &str| {
                entries
                    .get(key)
                    .filter(|value| !value.is_empty())
                    .map_or(DEFAULT_CERT_PASSWORD, String::as_str)
            };
            let cert_location = entries
                .get(CERT_LOCATION)
                .ok_or_else(|| {
                    Error::package(format!("TLS connection without {CERT_LOCATION}"))
                })?;
            let client = read_by_basename(&mut archive, &names, cert_location)?;
            let truststore = entries
                .get(CA_LOCATION)
                .map(|location| read_by_basename(&mut archive, &names, location))
                .transpose()?;

            let identity = TlsIdentity::from_pkcs12(
                &client,
                password(CLIENT_PASSWORD),
                truststore
                    .as_deref()
                    .map(|der| (der, password(CA_PASSWORD))),
            )?;
            Some(identity)
        } else {
            None
        };

        Ok(Self { cot_url, identity })
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(name)?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Certificates are referenced by their path on the device; match on file name.
fn read_by_basename<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    names: &[String],
    location: &str,
) -> Result<Vec<u8>> {
    let wanted = basename(location);
    let name = names
        .iter()
        .find(|name| basename(name) == wanted)
        .ok_or_else(|| Error::package(format!("certificate {wanted} not found in package")))?;
    read_entry(archive, name)
}

/// Parse `host:port:proto` into a destination URL.
fn parse_connect_string(value: &str) -> Result<CotUrl> {
    let mut parts = value.trim().rsplitn(3, ':');
    let (Some(proto), Some(port), Some(host)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::package(format!(
            "{CONNECT_STRING} {value:?} is not host:port:protocol"
        )));
    };
    let scheme = match proto.to_ascii_lowercase().as_str() {
        "ssl" | "tls" => "tls",
        "tcp" => "tcp",
        "udp" => "udp",
        other => {
            return Err(Error::package(format!(
                "unsupported protocol {other:?} in {CONNECT_STRING}"
            )))
        }
    };
    let port: u16 = port
        .parse()
        .map_err(|_| Error::package(format!("invalid port {port:?} in {CONNECT_STRING}")))?;
    CotUrl::from_parts(scheme, host, port)
}

fn entry_key(start: &BytesStart<'_>) -> Result<Option<String>> {
    let Some(attr) = start
        .try_get_attribute("key")
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };
    let key = attr.unescape_value().map_err(quick_xml::Error::from)?;
    Ok(Some(key.into_owned()))
}

/// Collect `<entry key="...">value</entry>` pairs from every preference group.
fn parse_entries(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(start) if start.name().as_ref() == b"entry" => {
                current = entry_key(&start)?;
                if let Some(key) = &current {
                    entries.insert(key.clone(), String::new());
                }
            }
            Event::Empty(start) if start.name().as_ref() == b"entry" => {
                if let Some(key) = entry_key(&start)? {
                    entries.insert(key, String::new());
                }
            }
            Event::Text(text) => {
                if let Some(key) = &current {
                    let value = text.unescape().map_err(quick_xml::Error::from)?;
                    entries.insert(key.clone(), value.trim().to_string());
                }
            }
            Event::CData(data) => {
                if let Some(key) = &current {
                    let value = String::from_utf8_lossy(&data.into_inner()).trim().to_string();
                    entries.insert(key.clone(), value);
                }
            }
            Event::End(end) if end.name().as_ref() == b"entry" => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}
