//! MQTT receiver.
//!
//! Subscribes to the sensor topics on every (re)connection and feeds each
//! publish through the [`SensorDecoder`] into the net queue.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sensor::{SensorDecoder, SensorEvent};
use crate::worker::Worker;

/// Delay before polling the event loop again after a broker error.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Largest MQTT packet accepted or sent. Sensors batch several detections
/// into one publish.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;

fn read_pem(what: &str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::tls(format!("{what} {}: {e}", path.display())))
}

/// Build the client options from configuration.
///
/// # Errors
///
/// Returns a TLS error if a configured certificate file cannot be read.
pub fn mqtt_options(config: &Config) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(
        config.mqtt_client_id(),
        config.mqtt_broker.clone(),
        config.mqtt_port,
    );
    options.set_keep_alive(KEEP_ALIVE);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    if let Some(username) = &config.mqtt_username {
        options.set_credentials(
            username.clone(),
            config.mqtt_password.clone().unwrap_or_default(),
        );
    }

    if let Some(cafile) = &config.mqtt_tls_client_cafile {
        let ca = read_pem("MQTT CA file", cafile)?;
        let client_auth = match &config.mqtt_tls_client_cert {
            Some(cert) => {
                let key = config.mqtt_tls_client_key.as_deref().unwrap_or(cert);
                Some((
                    read_pem("MQTT client certificate", cert)?,
                    read_pem("MQTT client key", key)?,
                ))
            }
            None => None,
        };
        options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        }));
    } else if config.mqtt_tls_client_cert.is_some() {
        return Err(Error::tls(
            "MQTT_TLS_CLIENT_CERT requires MQTT_TLS_CLIENT_CAFILE",
        ));
    }

    Ok(options)
}

/// Worker that receives sensor messages from the broker.
pub struct MqttWorker {
    options: MqttOptions,
    topic: String,
    decoder: SensorDecoder,
    queue: mpsc::Sender<SensorEvent>,
}

impl fmt::Debug for MqttWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (host, port) = self.options.broker_address();
        f.debug_struct("MqttWorker")
            .field("broker", &format!("{host}:{port}"))
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl MqttWorker {
    /// Create a receiver publishing into `queue`.
    #[must_use]
    pub fn new(
        options: MqttOptions,
        topic: impl Into<String>,
        queue: mpsc::Sender<SensorEvent>,
    ) -> Self {
        Self {
            options,
            topic: topic.into(),
            decoder: SensorDecoder::new(),
            queue,
        }
    }

    /// Decode a publish and queue the resulting events.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let events = match self.decoder.handle(topic, payload) {
            Ok(events) => events,
            Err(err) => {
                warn!(topic, error = %err, "Dropping undecodable sensor payload");
                return Ok(());
            }
        };
        for event in events {
            self.queue
                .send(event)
                .await
                .map_err(|_| Error::QueueClosed("net"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Worker for MqttWorker {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn run(mut self: Box<Self>) -> Result<()> {
        let (host, port) = self.options.broker_address();
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        info!(broker = %format!("{host}:{port}"), topic = %self.topic, "Connecting to MQTT broker");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(code = ?ack.code, "Connected to MQTT broker");
                    client
                        .try_subscribe(self.topic.clone(), QoS::AtMostOnce)
                        .map_err(|e| Error::mqtt(e.to_string()))?;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.publish(&publish.topic, &publish.payload).await?;
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!(topic = %self.topic, "Subscribed");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, delay = ?RECONNECT_DELAY, "MQTT connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}
