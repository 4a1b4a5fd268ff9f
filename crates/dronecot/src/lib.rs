//! `dronecot` - Remote ID to TAK gateway
//!
//! This library receives Open Drone ID data that Remote ID sensors publish
//! over MQTT, renders it as Cursor-on-Target events and delivers them to a
//! TAK server or multicast group.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod cot;
pub mod error;
pub mod gps;
pub mod logging;
pub mod mqtt;
pub mod odid;
pub mod pipeline;
pub mod sensor;
pub mod service;
pub mod tak;
pub mod worker;

pub use config::Config;
pub use cot::{CotSettings, Event};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use odid::UasData;
pub use sensor::{SensorDecoder, SensorEvent};
