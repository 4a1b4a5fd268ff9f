//! `COT_URL` parsing.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

/// Default TAK destination: the SA multicast group.
pub const DEFAULT_COT_URL: &str = "udp+wo://239.2.3.1:6969";

/// Transport selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// UDP unicast or multicast.
    Udp,
    /// UDP, write only (no listening socket).
    UdpWriteOnly,
    /// UDP broadcast.
    UdpBroadcast,
    /// Plain TCP stream.
    Tcp,
    /// TLS over TCP.
    Tls,
    /// Write events to the local log stream.
    Log,
}

impl Protocol {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "udp" => Some(Self::Udp),
            "udp+wo" => Some(Self::UdpWriteOnly),
            "udp+broadcast" => Some(Self::UdpBroadcast),
            "tcp" => Some(Self::Tcp),
            "tls" | "ssl" => Some(Self::Tls),
            "log" => Some(Self::Log),
            _ => None,
        }
    }

    /// Whether this protocol sends datagrams.
    #[must_use]
    pub fn is_udp(self) -> bool {
        matches!(self, Self::Udp | Self::UdpWriteOnly | Self::UdpBroadcast)
    }
}

/// Where to print events for `log://`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// A parsed TAK destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CotUrl {
    raw: String,
    protocol: Protocol,
    host: String,
    port: u16,
}

impl CotUrl {
    /// Parse a destination such as `tls://tak.example.com:8089`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown schemes and missing host or
    /// port.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::config(format!("COT_URL {input:?}: {reason}"));

        let url = Url::parse(input.trim()).map_err(|e| invalid(&e.to_string()))?;
        let protocol = Protocol::from_scheme(url.scheme())
            .ok_or_else(|| invalid(&format!("unsupported scheme {:?}", url.scheme())))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = if protocol == Protocol::Log {
            if !matches!(host.as_str(), "stdout" | "stderr") {
                return Err(invalid("log destination must be stdout or stderr"));
            }
            0
        } else {
            url.port().ok_or_else(|| invalid("missing port"))?
        };

        Ok(Self {
            raw: input.trim().to_string(),
            protocol,
            host,
            port,
        })
    }

    /// Build a URL from its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the parts do not form a valid destination.
    pub fn from_parts(scheme: &str, host: &str, port: u16) -> Result<Self> {
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        Self::parse(&format!("{scheme}://{host}:{port}"))
    }

    /// Transport protocol.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Destination host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port; 0 for `log://`.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether a TLS configuration is needed.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.protocol == Protocol::Tls
    }

    /// Output stream of a `log://` destination.
    #[must_use]
    pub fn log_stream(&self) -> Option<LogStream> {
        match (self.protocol, self.host.as_str()) {
            (Protocol::Log, "stdout") => Some(LogStream::Stdout),
            (Protocol::Log, "stderr") => Some(LogStream::Stderr),
            _ => None,
        }
    }
}

impl FromStr for CotUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CotUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
