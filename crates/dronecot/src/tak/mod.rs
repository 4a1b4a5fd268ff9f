//! Delivery of CoT events to a TAK endpoint.
//!
//! The destination is chosen by `COT_URL`. UDP destinations get one datagram
//! per event, TCP and TLS destinations a single long-lived stream. A failed
//! write ends the transmitter; the service manager restarts the process.

mod tls;
mod url;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

pub use self::tls::TlsIdentity;
pub use self::url::{CotUrl, LogStream, Protocol, DEFAULT_COT_URL};

use crate::error::{Error, Result};
use crate::worker::Worker;

/// Multicast TTL for UDP destinations.
pub const MULTICAST_TTL: u32 = 32;

/// A destination for serialized CoT events.
#[async_trait]
pub trait CotSink: Send {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be written.
    async fn send(&mut self, event: &[u8]) -> Result<()>;

    /// The destination, for logs.
    fn endpoint(&self) -> &str;
}

/// Sends each event as one UDP datagram.
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
    endpoint: String,
}

impl UdpSink {
    /// Open a socket for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve or the socket cannot be
    /// configured.
    pub async fn connect(url: &CotUrl) -> Result<Self> {
        let endpoint = url.to_string();
        let connect_error = |source| Error::TransportConnect {
            endpoint: endpoint.clone(),
            source,
        };

        let target = lookup_host((url.host(), url.port()))
            .await
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| {
                connect_error(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host did not resolve",
                ))
            })?;

        let bind: SocketAddr = if target.is_ipv6() {
            ([0u16; 8], 0).into()
        } else {
            ([0u8; 4], 0).into()
        };
        let socket = UdpSocket::bind(bind).await.map_err(connect_error)?;

        if url.protocol() == Protocol::UdpBroadcast {
            socket.set_broadcast(true).map_err(connect_error)?;
        }
        if target.is_ipv4() && target.ip().is_multicast() {
            socket
                .set_multicast_ttl_v4(MULTICAST_TTL)
                .map_err(connect_error)?;
        }

        Ok(Self {
            socket,
            target,
            endpoint,
        })
    }
}

#[async_trait]
impl CotSink for UdpSink {
    async fn send(&mut self, event: &[u8]) -> Result<()> {
        self.socket
            .send_to(event, self.target)
            .await
            .map_err(|source| Error::TransportSend {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Writes events back to back on a byte stream (TCP, TLS or stdio).
#[derive(Debug)]
pub struct StreamSink<S> {
    stream: S,
    endpoint: String,
    newline: bool,
}

impl<S> StreamSink<S>
where
    S: AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, endpoint: impl Into<String>) -> Self {
        Self {
            stream,
            endpoint: endpoint.into(),
            newline: false,
        }
    }

    /// Terminate every event with a newline.
    #[must_use]
    pub fn line_delimited(mut self) -> Self {
        self.newline = true;
        self
    }

    /// Consume the sink and return the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> CotSink for StreamSink<S>
where
    S: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, event: &[u8]) -> Result<()> {
        let send_error = |source| Error::TransportSend {
            endpoint: self.endpoint.clone(),
            source,
        };
        self.stream.write_all(event).await.map_err(send_error)?;
        if self.newline {
            self.stream.write_all(b"\n").await.map_err(send_error)?;
        }
        self.stream.flush().await.map_err(send_error)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Open the sink `url` names.
///
/// # Errors
///
/// Returns an error if the destination cannot be reached, or if a TLS
/// destination comes without a TLS configuration.
pub async fn connect(
    url: &CotUrl,
    tls: Option<Arc<rustls::ClientConfig>>,
) -> Result<Box<dyn CotSink>> {
    let endpoint = url.to_string();
    let connect_error = |source| Error::TransportConnect {
        endpoint: endpoint.clone(),
        source,
    };

    let sink: Box<dyn CotSink> = match url.protocol() {
        Protocol::Udp | Protocol::UdpWriteOnly | Protocol::UdpBroadcast => {
            Box::new(UdpSink::connect(url).await?)
        }
        Protocol::Tcp => {
            let stream = TcpStream::connect((url.host(), url.port()))
                .await
                .map_err(connect_error)?;
            Box::new(StreamSink::new(stream, endpoint.clone()))
        }
        Protocol::Tls => {
            let config =
                tls.ok_or_else(|| Error::tls(format!("no TLS configuration for {endpoint}")))?;
            let server_name = rustls_pki_types::ServerName::try_from(url.host().to_string())
                .map_err(|e| Error::tls(format!("invalid server name {}: {e}", url.host())))?;
            let stream = TcpStream::connect((url.host(), url.port()))
                .await
                .map_err(connect_error)?;
            let stream = TlsConnector::from(config)
                .connect(server_name, stream)
                .await
                .map_err(connect_error)?;
            Box::new(StreamSink::new(stream, endpoint.clone()))
        }
        Protocol::Log => match url.log_stream() {
            Some(LogStream::Stderr) => {
                Box::new(StreamSink::new(tokio::io::stderr(), endpoint.clone()).line_delimited())
            }
            _ => Box::new(StreamSink::new(tokio::io::stdout(), endpoint.clone()).line_delimited()),
        },
    };

    info!(endpoint = %url, "Connected to TAK destination");
    Ok(sink)
}

/// Worker that drains the transmit queue into the TAK destination.
#[derive(Debug)]
pub struct TxWorker {
    url: CotUrl,
    tls: Option<Arc<rustls::ClientConfig>>,
    queue: mpsc::Receiver<Vec<u8>>,
}

impl TxWorker {
    /// Create a transmitter for `url`.
    #[must_use]
    pub fn new(
        url: CotUrl,
        tls: Option<Arc<rustls::ClientConfig>>,
        queue: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self { url, tls, queue }
    }
}

#[async_trait]
impl Worker for TxWorker {
    fn name(&self) -> &'static str {
        "tx"
    }

    async fn run(mut self: Box<Self>) -> Result<()> {
        let mut sink = connect(&self.url, self.tls.clone()).await?;
        while let Some(event) = self.queue.recv().await {
            sink.send(&event).await?;
            debug!(endpoint = sink.endpoint(), bytes = event.len(), "Sent CoT event");
        }
        info!("Transmit queue closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_stream_sink_writes_events_back_to_back() {
        let mut sink = StreamSink::new(Vec::new(), "memory");
        sink.send(b"<a/>").await.unwrap();
        sink.send(b"<b/>").await.unwrap();
        assert_eq!(sink.endpoint(), "memory");
        assert_eq!(sink.into_inner(), b"<a/><b/>");
    }

    #[tokio::test]
    async fn test_line_delimited_sink() {
        let mut sink = StreamSink::new(Vec::new(), "memory").line_delimited();
        sink.send(b"<a/>").await.unwrap();
        assert_eq!(sink.into_inner(), b"<a/>\n");
    }

    #[tokio::test]
    async fn test_udp_sink_sends_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let url = CotUrl::from_parts("udp", "127.0.0.1", port).unwrap();

        let mut sink = connect(&url, None).await.unwrap();
        sink.send(b"<event/>").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"<event/>");
    }

    #[tokio::test]
    async fn test_tcp_sink() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = CotUrl::from_parts("tcp", "127.0.0.1", port).unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut sink = connect(&url, None).await.unwrap();
        sink.send(b"<one/>").await.unwrap();
        sink.send(b"<two/>").await.unwrap();
        drop(sink);

        assert_eq!(accept.await.unwrap(), b"<one/><two/>");
    }

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = CotUrl::from_parts("tcp", "127.0.0.1", port).unwrap();
        let err = connect(&url, None).await.err().unwrap();
        assert!(matches!(err, Error::TransportConnect { .. }));
        assert!(!err.is_config_error());
    }

    #[tokio::test]
    async fn test_tls_requires_configuration() {
        let url = CotUrl::parse("tls://127.0.0.1:8089").unwrap();
        let err = connect(&url, None).await.err().unwrap();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_tx_worker_drains_queue() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let url = CotUrl::from_parts("udp", "127.0.0.1", port).unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(b"<event/>".to_vec()).await.unwrap();
        drop(tx);

        let worker = Box::new(TxWorker::new(url, None, rx));
        assert_eq!(worker.name(), "tx");
        worker.run().await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"<event/>");
    }
}
