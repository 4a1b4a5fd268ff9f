//! Local GPS fix from gpsd.
//!
//! When a sensor has no position of its own, the gateway asks the local gpsd
//! through `gpspipe` for a TPV (time-position-velocity) report.

use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cot::Point;
use crate::error::{Error, Result};

/// Default command used to query gpsd.
pub const DEFAULT_GPS_INFO_CMD: &str = "gpspipe --json -n 5";

/// How long the command may run.
pub const GPS_TIMEOUT: Duration = Duration::from_secs(10);

/// A gpsd TPV report.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpsFix {
    /// Report class, `TPV`.
    #[serde(default)]
    pub class: String,
    /// Fix mode: 0/1 none, 2 2D, 3 3D.
    pub mode: Option<u8>,
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lon: Option<f64>,
    /// Height above the ellipsoid in meters.
    #[serde(rename = "altHAE")]
    pub alt_hae: Option<f64>,
    /// Altitude reported by older gpsd releases.
    pub alt: Option<f64>,
    /// Ground speed in m/s.
    pub speed: Option<f64>,
    /// Course over ground in degrees.
    pub track: Option<f64>,
    /// Estimated horizontal error in meters.
    pub eph: Option<f64>,
    /// Estimated vertical error in meters.
    pub epv: Option<f64>,
}

impl GpsFix {
    /// The fix as a CoT point, when it has a horizontal position.
    #[must_use]
    pub fn point(&self) -> Option<Point> {
        let (lat, lon) = (self.lat?, self.lon?);
        Some(
            Point::new(lat, lon)
                .with_hae(self.alt_hae.or(self.alt))
                .with_error(self.eph, self.epv),
        )
    }
}

/// Pick the last TPV report out of `gpspipe --json` output.
#[must_use]
pub fn parse_gpspipe(output: &str) -> Option<GpsFix> {
    let line = output.lines().rev().find(|line| line.contains("TPV"))?;
    match serde_json::from_str(line) {
        Ok(fix) => Some(fix),
        Err(err) => {
            warn!(error = %err, "Unparsable TPV report from gpsd");
            None
        }
    }
}

/// Run `cmd` through the shell and parse its output as a gpsd fix.
///
/// An empty command disables the lookup and yields `Ok(None)`.
///
/// # Errors
///
/// Returns an error if the command cannot be started, fails or times out.
pub async fn gps_info(cmd: &str, timeout: Duration) -> Result<Option<GpsFix>> {
    let cmd = cmd.trim();
    if cmd.is_empty() {
        return Ok(None);
    }

    debug!(cmd, "Querying GPS");
    let output = tokio::time::timeout(
        timeout,
        Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| Error::Timeout {
        operation: format!("GPS query `{cmd}`"),
    })??;

    if !output.status.success() {
        return Err(Error::internal(format!(
            "GPS query `{cmd}` exited with {}",
            output.status
        )));
    }

    Ok(parse_gpspipe(&String::from_utf8_lossy(&output.stdout)))
}
