//! Command-line interface for the `dronecot` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::logging::Verbosity;

/// dronecot - Remote ID to TAK gateway
///
/// Receives Open Drone ID detections from Remote ID sensors over MQTT and
/// forwards aircraft, operator and sensor positions to TAK as
/// Cursor-on-Target events.
#[derive(Debug, Parser)]
#[command(name = "dronecot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the INI configuration file [default: config.ini]
    #[arg(
        short = 'c',
        long = "config-file",
        visible_alias = "CONFIG_FILE",
        value_name = "FILE"
    )]
    pub config_file: Option<PathBuf>,

    /// TAK connection preference package (zip)
    #[arg(
        short = 'p',
        long = "pref-package",
        visible_alias = "PREF_PACKAGE",
        value_name = "ZIP"
    )]
    pub pref_package: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Print a systemd unit for this executable and exit
    #[arg(long)]
    pub service_unit: bool,
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
