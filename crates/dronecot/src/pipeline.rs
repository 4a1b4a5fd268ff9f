//! The gateway pipeline.
//!
//! ```text
//! MqttWorker --net queue--> RidWorker --tx queue--> TxWorker
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::cot::{operator_event, sensor_status_event, uas_event, CotSettings, Event};
use crate::error::{Error, Result};
use crate::gps::{gps_info, GpsFix, GPS_TIMEOUT};
use crate::mqtt::{mqtt_options, MqttWorker};
use crate::sensor::{SensorEvent, SensorStatus};
use crate::tak::TxWorker;
use crate::worker::{shutdown_signal, WorkerSet};

/// Worker that renders sensor events as CoT.
#[derive(Debug)]
pub struct RidWorker {
    settings: CotSettings,
    gps_info_cmd: String,
    input: mpsc::Receiver<SensorEvent>,
    output: mpsc::Sender<Vec<u8>>,
}

impl RidWorker {
    /// Create a renderer between the net and tx queues.
    #[must_use]
    pub fn new(
        settings: CotSettings,
        gps_info_cmd: impl Into<String>,
        input: mpsc::Receiver<SensorEvent>,
        output: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            settings,
            gps_info_cmd: gps_info_cmd.into(),
            input,
            output,
        }
    }

    /// Render one sensor event. Detections yield the aircraft and then the
    /// operator; events without a usable position are left out.
    pub async fn render(&self, event: &SensorEvent) -> Vec<Event> {
        match event {
            SensorEvent::Detection(report) => {
                let uas = uas_event(report, &self.settings);
                if uas.is_none() {
                    debug!(uas_id = report.uas_id(), "No valid UAS position");
                }
                let operator = operator_event(report, &self.settings);
                if operator.is_none() {
                    debug!(uas_id = report.uas_id(), "No valid operator position");
                }
                uas.into_iter().chain(operator).collect()
            }
            SensorEvent::Status(status) => {
                let fix = self.gps_fix(status).await;
                let event = sensor_status_event(status, &self.settings, fix.as_ref());
                if event.is_none() {
                    warn!(sensor_id = %status.sensor_id, "No position for sensor");
                }
                event.into_iter().collect()
            }
        }
    }

    /// Query GPS only when neither the sensor nor the configuration gives a
    /// position.
    async fn gps_fix(&self, status: &SensorStatus) -> Option<GpsFix> {
        let reported = status
            .position
            .as_ref()
            .and_then(|position| position.coordinates())
            .is_some();
        if reported || self.settings.sensor_position.is_some() {
            return None;
        }
        match gps_info(&self.gps_info_cmd, GPS_TIMEOUT).await {
            Ok(fix) => fix,
            Err(err) => {
                warn!(error = %err, "GPS lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl crate::worker::Worker for RidWorker {
    fn name(&self) -> &'static str {
        "rid"
    }

    async fn run(mut self: Box<Self>) -> Result<()> {
        while let Some(event) = self.input.recv().await {
            for cot in self.render(&event).await {
                let xml = match cot.to_xml() {
                    Ok(xml) => xml,
                    Err(err) => {
                        warn!(uid = %cot.uid, error = %err, "Skipping unencodable event");
                        continue;
                    }
                };
                debug!(uid = %cot.uid, cot_type = %cot.cot_type, "Queued CoT event");
                self.output
                    .send(xml)
                    .await
                    .map_err(|_| Error::QueueClosed("tx"))?;
            }
        }
        info!("Net queue closed");
        Ok(())
    }
}

/// Build the three gateway workers and their queues.
///
/// # Errors
///
/// Returns a configuration error if the destination, TLS material or MQTT
/// settings are unusable.
pub fn build_workers(config: &Config) -> Result<WorkerSet> {
    let url = config.cot_url()?;
    let tls = if url.is_tls() {
        let identity = config.tak_tls_identity()?;
        Some(Arc::new(identity.client_config(config.pytak_tls_dont_verify)?))
    } else {
        None
    };
    let options = mqtt_options(config)?;

    let (net_tx, net_rx) = mpsc::channel(config.max_in_queue);
    let (tx_tx, tx_rx) = mpsc::channel(config.max_out_queue);

    let mut workers = WorkerSet::new();
    workers.add(TxWorker::new(url, tls, tx_rx));
    workers.add(RidWorker::new(
        config.cot_settings(),
        config.gps_info_cmd.clone(),
        net_rx,
        tx_tx,
    ));
    workers.add(MqttWorker::new(options, config.mqtt_topic.clone(), net_tx));
    Ok(workers)
}

/// Run the gateway until a worker fails or the process is signalled.
///
/// # Errors
///
/// Returns a configuration error before anything starts, or the error of the
/// first worker to fail.
pub async fn run(config: &Config) -> Result<()> {
    let workers = build_workers(config)?;
    info!(
        workers = ?workers.names(),
        cot_url = %config.cot_url,
        broker = %config.mqtt_broker,
        "Starting dronecot"
    );
    workers.run_until(shutdown_signal()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cot::FixedPosition;
    use crate::odid::testing::{empty_payload, full_payload};
    use crate::odid::UasData;
    use crate::sensor::{ReceiverInfo, RemoteIdReport, SensorPosition};
    use crate::worker::Worker;
    use serde_json::Map;

    fn detection(payload: &[u8]) -> SensorEvent {
        SensorEvent::Detection(Box::new(RemoteIdReport {
            uas: UasData::decode(payload).unwrap(),
            receiver: ReceiverInfo::default(),
            serial: None,
            topic: "ctl/rid/rx1/detection".to_string(),
        }))
    }

    fn status(position: Option<SensorPosition>) -> SensorEvent {
        SensorEvent::Status(SensorStatus {
            sensor_id: "rx1".to_string(),
            status: Map::new(),
            position,
        })
    }

    fn worker(settings: CotSettings, gps: &str) -> (RidWorker, mpsc::Sender<SensorEvent>, mpsc::Receiver<Vec<u8>>) {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        (RidWorker::new(settings, gps, in_rx, out_tx), in_tx, out_rx)
    }

    #[tokio::test]
    async fn test_detection_renders_uas_then_operator() {
        let (worker, _, _) = worker(CotSettings::default(), "");
        let events = worker.render(&detection(&full_payload())).await;
        let uids: Vec<_> = events.iter().map(|event| event.uid.as_str()).collect();
        assert_eq!(
            uids,
            vec!["RID.1581F5FJD239C00DW22E.uas", "RID.1581F5FJD239C00DW22E.op"]
        );
    }

    #[tokio::test]
    async fn test_detection_without_positions_renders_nothing() {
        let (worker, _, _) = worker(CotSettings::default(), "");
        assert!(worker.render(&detection(&empty_payload())).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_with_configured_position() {
        let settings = CotSettings {
            sensor_position: Some(FixedPosition {
                lat: 37.76,
                lon: -122.41,
                alt: None,
            }),
            ..CotSettings::default()
        };
        // A failing command proves GPS is never consulted.
        let (worker, _, _) = worker(settings, "exit 1");
        let events = worker.render(&status(None)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "CUAS.rx1");
    }

    #[tokio::test]
    async fn test_status_without_any_position() {
        let (worker, _, _) = worker(CotSettings::default(), "");
        assert!(worker.render(&status(None)).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_falls_back_to_gps() {
        let cmd = r#"echo '{"class":"TPV","mode":3,"lat":37.7612,"lon":-122.4134,"altHAE":28.5}'"#;
        let (worker, _, _) = worker(CotSettings::default(), cmd);
        let events = worker.render(&status(None)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].point.lat, 37.7612);
    }

    #[tokio::test]
    async fn test_status_with_failing_gps() {
        let (worker, _, _) = worker(CotSettings::default(), "exit 3");
        assert!(worker.render(&status(None)).await.is_empty());
    }

    #[tokio::test]
    async fn test_run_forwards_serialized_events() {
        let (worker, input, mut output) = worker(CotSettings::default(), "");
        input.send(detection(&full_payload())).await.unwrap();
        drop(input);

        Box::new(worker).run().await.unwrap();

        let first = String::from_utf8(output.recv().await.unwrap()).unwrap();
        let second = String::from_utf8(output.recv().await.unwrap()).unwrap();
        assert!(first.starts_with("<?xml"));
        assert!(first.contains(r#"uid="RID.1581F5FJD239C00DW22E.uas""#));
        assert!(second.contains(r#"uid="RID.1581F5FJD239C00DW22E.op""#));
        assert!(output.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_fails_when_tx_queue_closes() {
        let (worker, input, output) = worker(CotSettings::default(), "");
        drop(output);
        input.send(detection(&full_payload())).await.unwrap();

        let err = Box::new(worker).run().await.unwrap_err();
        assert!(matches!(err, Error::QueueClosed("tx")));
    }

    #[test]
    fn test_build_workers() {
        let config = Config::from_ini_str("COT_URL=log://stdout\n").unwrap();
        let workers = build_workers(&config).unwrap();
        assert_eq!(workers.names(), vec!["tx", "rid", "mqtt"]);
    }

    #[test]
    fn test_tls_destination_needs_trust() {
        let config = Config::from_ini_str("COT_URL=tls://tak.example.com:8089\n").unwrap();
        let err = build_workers(&config).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_tls_destination_without_verification() {
        let config = Config::from_ini_str(
            "COT_URL=tls://tak.example.com:8089\nPYTAK_TLS_DONT_VERIFY=1\n",
        )
        .unwrap();
        assert_eq!(build_workers(&config).unwrap().count(), 3);
    }
}
