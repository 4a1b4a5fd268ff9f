//! Configuration management for dronecot.
//!
//! Configuration is loaded with figment from, lowest precedence first:
//! 1. Default values
//! 2. The INI config file (`config.ini`, keys outside any section and in
//!    the `[dronecot]` section)
//! 3. Environment variables with the same names as the INI keys
//! 4. A TAK connection preference package, when one is given
//!
//! Key names are case-insensitive. File and environment values reach the
//! config as plain strings, so `0123` keeps its leading zero. They are read
//! leniently: `1`, `yes`, `on` and `true` are all true, and numbers may be
//! quoted.

mod env;
mod ini;
mod pref;

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::Serialized;
use figment::{Figment, Provider};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use self::env::EnvVars;
pub use self::ini::IniFile;
pub use self::pref::{PrefPackage, DEFAULT_CERT_PASSWORD};

use crate::cot::{
    CotSettings, FixedPosition, DEFAULT_COT_ACCESS, DEFAULT_COT_STALE, DEFAULT_OP_COT_TYPE,
    DEFAULT_SENSOR_COT_TYPE, DEFAULT_SENSOR_PAYLOAD_TYPE,
};
use crate::error::{Error, Result};
use crate::gps::DEFAULT_GPS_INFO_CMD;
use crate::tak::{CotUrl, TlsIdentity, DEFAULT_COT_URL};

/// Config file read when `-c` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.ini";

/// INI section holding the application keys.
pub const CONFIG_SECTION: &str = "dronecot";

/// Default MQTT broker host.
pub const DEFAULT_MQTT_BROKER: &str = "localhost";

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT subscription: everything.
pub const DEFAULT_MQTT_TOPIC: &str = "#";

/// Default capacity of the queue between the MQTT and RID workers.
pub const DEFAULT_MAX_IN_QUEUE: usize = 500;

/// Default capacity of the queue between the RID and TX workers.
pub const DEFAULT_MAX_OUT_QUEUE: usize = 100;

/// Keys read from the environment.
const KEYS: [&str; 30] = [
    "debug",
    "mqtt_broker",
    "mqtt_port",
    "mqtt_topic",
    "mqtt_client_id",
    "mqtt_username",
    "mqtt_password",
    "mqtt_tls_client_cert",
    "mqtt_tls_client_key",
    "mqtt_tls_client_cafile",
    "cot_url",
    "cot_stale",
    "cot_host_id",
    "cot_access",
    "pytak_tls_client_cert",
    "pytak_tls_client_key",
    "pytak_tls_client_cafile",
    "pytak_tls_dont_verify",
    "sensor_id",
    "sensor_payload_type",
    "sensor_cot_type",
    "uas_cot_type",
    "op_cot_type",
    "sensor_lat",
    "sensor_lon",
    "sensor_alt",
    "gps_info_cmd",
    "max_in_queue",
    "max_out_queue",
    "pref_package",
];

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging.
    #[serde(deserialize_with = "loose::flag")]
    pub debug: bool,

    /// MQTT broker host.
    #[serde(deserialize_with = "loose::value")]
    pub mqtt_broker: String,
    /// MQTT broker port.
    #[serde(deserialize_with = "loose::value")]
    pub mqtt_port: u16,
    /// Subscription topic filter.
    #[serde(deserialize_with = "loose::value")]
    pub mqtt_topic: String,
    /// MQTT client id; defaults to the sensor id.
    #[serde(deserialize_with = "loose::optional")]
    pub mqtt_client_id: Option<String>,
    /// MQTT username.
    #[serde(deserialize_with = "loose::optional")]
    pub mqtt_username: Option<String>,
    /// MQTT password.
    #[serde(deserialize_with = "loose::optional")]
    pub mqtt_password: Option<String>,
    /// PEM client certificate for the broker.
    #[serde(deserialize_with = "loose::optional")]
    pub mqtt_tls_client_cert: Option<PathBuf>,
    /// PEM client key for the broker.
    #[serde(deserialize_with = "loose::optional")]
    pub mqtt_tls_client_key: Option<PathBuf>,
    /// PEM CA bundle for the broker; enables TLS.
    #[serde(deserialize_with = "loose::optional")]
    pub mqtt_tls_client_cafile: Option<PathBuf>,

    /// TAK destination.
    #[serde(deserialize_with = "loose::value")]
    pub cot_url: String,
    /// Event lifetime in seconds.
    #[serde(deserialize_with = "loose::value")]
    pub cot_stale: u64,
    /// Identity of this gateway; defaults to `dronecot@<hostname>`.
    #[serde(deserialize_with = "loose::optional")]
    pub cot_host_id: Option<String>,
    /// Access marking on every event.
    #[serde(deserialize_with = "loose::value")]
    pub cot_access: String,

    /// PEM client certificate for TAK.
    #[serde(deserialize_with = "loose::optional")]
    pub pytak_tls_client_cert: Option<PathBuf>,
    /// PEM client key for TAK.
    #[serde(deserialize_with = "loose::optional")]
    pub pytak_tls_client_key: Option<PathBuf>,
    /// PEM CA bundle for TAK.
    #[serde(deserialize_with = "loose::optional")]
    pub pytak_tls_client_cafile: Option<PathBuf>,
    /// Skip TAK server certificate verification.
    #[serde(deserialize_with = "loose::flag")]
    pub pytak_tls_dont_verify: bool,

    /// Sensor id; defaults to `dronecot_<hostname>`.
    #[serde(deserialize_with = "loose::optional")]
    pub sensor_id: Option<String>,
    /// Payload type reported when a detection does not name one.
    #[serde(deserialize_with = "loose::value")]
    pub sensor_payload_type: String,
    /// CoT type of sensor events.
    #[serde(deserialize_with = "loose::value")]
    pub sensor_cot_type: String,
    /// CoT type of aircraft events; derived from the UA type when unset.
    #[serde(deserialize_with = "loose::optional")]
    pub uas_cot_type: Option<String>,
    /// CoT type of operator events.
    #[serde(deserialize_with = "loose::value")]
    pub op_cot_type: String,
    /// Fixed sensor latitude.
    #[serde(deserialize_with = "loose::optional")]
    pub sensor_lat: Option<f64>,
    /// Fixed sensor longitude.
    #[serde(deserialize_with = "loose::optional")]
    pub sensor_lon: Option<f64>,
    /// Fixed sensor altitude (HAE).
    #[serde(deserialize_with = "loose::optional")]
    pub sensor_alt: Option<f64>,
    /// Command printing gpsd JSON; empty disables the lookup.
    #[serde(deserialize_with = "loose::value")]
    pub gps_info_cmd: String,

    /// Capacity of the MQTT to RID queue.
    #[serde(deserialize_with = "loose::value")]
    pub max_in_queue: usize,
    /// Capacity of the RID to TX queue.
    #[serde(deserialize_with = "loose::value")]
    pub max_out_queue: usize,

    /// Preference package to apply on top of this configuration.
    #[serde(deserialize_with = "loose::optional")]
    pub pref_package: Option<PathBuf>,

    /// TLS identity taken from a preference package.
    #[serde(skip)]
    pub tls_identity: Option<TlsIdentity>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            mqtt_broker: DEFAULT_MQTT_BROKER.to_string(),
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_topic: DEFAULT_MQTT_TOPIC.to_string(),
            mqtt_client_id: None,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_tls_client_cert: None,
            mqtt_tls_client_key: None,
            mqtt_tls_client_cafile: None,
            cot_url: DEFAULT_COT_URL.to_string(),
            cot_stale: DEFAULT_COT_STALE,
            cot_host_id: None,
            cot_access: DEFAULT_COT_ACCESS.to_string(),
            pytak_tls_client_cert: None,
            pytak_tls_client_key: None,
            pytak_tls_client_cafile: None,
            pytak_tls_dont_verify: false,
            sensor_id: None,
            sensor_payload_type: DEFAULT_SENSOR_PAYLOAD_TYPE.to_string(),
            sensor_cot_type: DEFAULT_SENSOR_COT_TYPE.to_string(),
            uas_cot_type: None,
            op_cot_type: DEFAULT_OP_COT_TYPE.to_string(),
            sensor_lat: None,
            sensor_lon: None,
            sensor_alt: None,
            gps_info_cmd: DEFAULT_GPS_INFO_CMD.to_string(),
            max_in_queue: DEFAULT_MAX_IN_QUEUE,
            max_out_queue: DEFAULT_MAX_OUT_QUEUE,
            pref_package: None,
            tls_identity: None,
        }
    }
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

impl Config {
    /// Load configuration and apply a preference package.
    ///
    /// `pref_package` takes precedence over the `PREF_PACKAGE` key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config file, the values or the
    /// package are unusable.
    pub fn load(config_path: Option<PathBuf>, pref_package: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::load_from(config_path)?;
        if let Some(path) = pref_package.or_else(|| config.pref_package.clone()) {
            config.apply_pref_package(PrefPackage::load(&path)?);
            config.pref_package = Some(path);
            config.validate()?;
        }
        Ok(config)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// Without a path, `config.ini` in the working directory is read when it
    /// exists. An explicit path must be readable.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => {
                std::fs::File::open(&path).map_err(|e| Error::ConfigFile {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                path
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        debug!(path = %config_file.display(), "Loading configuration");

        Self::extract(
            IniFile::file(&config_file, CONFIG_SECTION),
            EnvVars::only(&KEYS),
        )
    }

    /// Load configuration from INI text, without the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_ini_str(contents: &str) -> Result<Self> {
        Self::extract(
            IniFile::string(contents, CONFIG_SECTION),
            Serialized::defaults(figment::value::Dict::new()),
        )
    }

    fn extract(ini: impl Provider, overrides: impl Provider) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(ini)
            .merge(overrides)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the destination and TLS identity with those of a package.
    pub fn apply_pref_package(&mut self, package: PrefPackage) {
        self.cot_url = package.cot_url.to_string();
        self.tls_identity = package.identity;
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cot_stale == 0 {
            return Err(Error::config("COT_STALE must be greater than 0"));
        }
        if self.max_in_queue == 0 || self.max_out_queue == 0 {
            return Err(Error::config(
                "MAX_IN_QUEUE and MAX_OUT_QUEUE must be greater than 0",
            ));
        }

        let cot_type = Regex::new(r"^[a-zA-Z](-[a-zA-Z0-9.]+)+$")
            .map_err(|e| Error::internal(e.to_string()))?;
        let types = [
            ("SENSOR_COT_TYPE", Some(self.sensor_cot_type.as_str())),
            ("OP_COT_TYPE", Some(self.op_cot_type.as_str())),
            ("UAS_COT_TYPE", self.uas_cot_type.as_deref()),
        ];
        for (key, value) in types {
            if let Some(value) = value {
                if !cot_type.is_match(value) {
                    return Err(Error::config(format!("{key} {value:?} is not a CoT type")));
                }
            }
        }

        CotUrl::parse(&self.cot_url)?;

        if self.mqtt_tls_client_key.is_some() && self.mqtt_tls_client_cert.is_none() {
            return Err(Error::config(
                "MQTT_TLS_CLIENT_KEY requires MQTT_TLS_CLIENT_CERT",
            ));
        }
        if self.sensor_lat.is_some() != self.sensor_lon.is_some() {
            return Err(Error::config(
                "SENSOR_LAT and SENSOR_LON must be set together",
            ));
        }

        Ok(())
    }

    /// Identity of this gateway instance.
    #[must_use]
    pub fn host_id(&self) -> String {
        self.cot_host_id
            .clone()
            .unwrap_or_else(|| format!("dronecot@{}", hostname()))
    }

    /// Sensor id reported for detections that do not carry one.
    #[must_use]
    pub fn sensor_id(&self) -> String {
        self.sensor_id
            .clone()
            .unwrap_or_else(|| format!("dronecot_{}", hostname()))
    }

    /// MQTT client id.
    #[must_use]
    pub fn mqtt_client_id(&self) -> String {
        self.mqtt_client_id
            .clone()
            .unwrap_or_else(|| self.sensor_id())
    }

    /// The parsed TAK destination.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `COT_URL` is invalid.
    pub fn cot_url(&self) -> Result<CotUrl> {
        CotUrl::parse(&self.cot_url)
    }

    /// Fixed sensor location, when both coordinates are configured.
    #[must_use]
    pub fn sensor_position(&self) -> Option<FixedPosition> {
        Some(FixedPosition {
            lat: self.sensor_lat?,
            lon: self.sensor_lon?,
            alt: self.sensor_alt,
        })
    }

    /// Settings for the CoT renderers.
    #[must_use]
    pub fn cot_settings(&self) -> CotSettings {
        CotSettings {
            host_id: self.host_id(),
            stale: Duration::from_secs(self.cot_stale),
            access: self.cot_access.clone(),
            uas_cot_type: self.uas_cot_type.clone(),
            op_cot_type: self.op_cot_type.clone(),
            sensor_cot_type: self.sensor_cot_type.clone(),
            sensor_id: self.sensor_id(),
            sensor_payload_type: self.sensor_payload_type.clone(),
            sensor_position: self.sensor_position(),
        }
    }

    /// TLS identity for the TAK connection: the preference package's, else
    /// the `PYTAK_TLS_*` PEM files.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM files cannot be read.
    pub fn tak_tls_identity(&self) -> Result<TlsIdentity> {
        if let Some(identity) = &self.tls_identity {
            return Ok(identity.clone());
        }
        TlsIdentity::from_pem_files(
            self.pytak_tls_client_cert.as_deref(),
            self.pytak_tls_client_key.as_deref(),
            self.pytak_tls_client_cafile.as_deref(),
        )
    }
}

/// Deserializers accepting the loosely typed values of INI files and the
/// environment.
mod loose {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::{self, Deserializer};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        UInt(u64),
        Float(f64),
        Text(String),
    }

    impl Scalar {
        fn into_text(self) -> String {
            match self {
                Self::Bool(value) => value.to_string(),
                Self::Int(value) => value.to_string(),
                Self::UInt(value) => value.to_string(),
                Self::Float(value) => value.to_string(),
                Self::Text(value) => value.trim().to_string(),
            }
        }
    }

    fn parse<T, E>(text: &str) -> Result<T, E>
    where
        T: FromStr,
        T::Err: Display,
        E: de::Error,
    {
        text.parse()
            .map_err(|e| E::custom(format!("invalid value {text:?}: {e}")))
    }

    pub fn value<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        parse(&Scalar::deserialize(deserializer)?.into_text())
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        match Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_text) {
            Some(text) if !text.is_empty() => parse(&text).map(Some),
            _ => Ok(None),
        }
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Scalar::deserialize(deserializer)? {
            Scalar::Bool(value) => Ok(value),
            Scalar::Int(value) => Ok(value != 0),
            Scalar::UInt(value) => Ok(value != 0),
            Scalar::Float(value) => Ok(value != 0.0),
            Scalar::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "" | "0" | "false" | "no" | "off" => Ok(false),
                other => Err(de::Error::custom(format!("invalid flag {other:?}"))),
            },
        }
    }
}
