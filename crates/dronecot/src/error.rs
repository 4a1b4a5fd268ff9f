//! Error types for dronecot.
//!
//! This module defines all error types used throughout the dronecot crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dronecot operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// An explicitly requested configuration file could not be read.
    #[error("cannot read configuration file {path}: {message}")]
    ConfigFile {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A connection preference package could not be used.
    #[error("invalid preference package {path}: {message}")]
    PrefPackage {
        /// Path to the package.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// A preference package lacks something it needs.
    #[error("{0}")]
    PackageContent(String),

    /// A zip archive could not be read.
    #[error("zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An XML document could not be parsed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// TLS material could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    // === Decoding Errors ===
    /// An Open Drone ID payload could not be decoded.
    #[error("invalid Open Drone ID payload: {0}")]
    OdidPayload(String),

    /// A sensor message could not be decoded.
    #[error("invalid sensor message: {0}")]
    SensorMessage(String),

    // === CoT Errors ===
    /// Serializing a CoT event failed.
    #[error("failed to encode CoT event: {0}")]
    CotEncode(String),

    // === Transport Errors ===
    /// Connecting to the TAK endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    TransportConnect {
        /// The endpoint URL.
        endpoint: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Sending to the TAK endpoint failed.
    #[error("failed to send to {endpoint}: {source}")]
    TransportSend {
        /// The endpoint URL.
        endpoint: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The MQTT client failed.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// A worker queue closed while the gateway was running.
    #[error("queue closed: {0}")]
    QueueClosed(&'static str),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for dronecot operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a preference package error.
    #[must_use]
    pub fn pref_package(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PrefPackage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a preference package content error.
    #[must_use]
    pub fn package(message: impl Into<String>) -> Self {
        Self::PackageContent(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an Open Drone ID decoding error.
    #[must_use]
    pub fn odid(message: impl Into<String>) -> Self {
        Self::OdidPayload(message.into())
    }

    /// Create a sensor message error.
    #[must_use]
    pub fn sensor(message: impl Into<String>) -> Self {
        Self::SensorMessage(message.into())
    }

    /// Create a CoT encoding error.
    #[must_use]
    pub fn cot_encode(message: impl Into<String>) -> Self {
        Self::CotEncode(message.into())
    }

    /// Create an MQTT error.
    #[must_use]
    pub fn mqtt(message: impl Into<String>) -> Self {
        Self::Mqtt(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error comes from configuration rather than runtime.
    ///
    /// Configuration errors will not go away by restarting the process, so
    /// the binary maps them to a dedicated exit status.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_)
                | Self::ConfigFile { .. }
                | Self::ConfigValidation { .. }
                | Self::PrefPackage { .. }
                | Self::PackageContent(_)
                | Self::Zip(_)
                | Self::Xml(_)
                | Self::Tls(_)
        )
    }

    /// Check if this error only affects a single inbound message.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::OdidPayload(_) | Self::SensorMessage(_) | Self::Json(_)
        )
    }
}
