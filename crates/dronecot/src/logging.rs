//! Logging configuration for dronecot.
//!
//! This module provides initialization and configuration for the tracing-based
//! logging system used throughout dronecot. Output goes to stderr, which the
//! service manager forwards to the system journal.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Raise the verbosity to at least debug when `debug` is set.
    ///
    /// `-q` still wins over a `DEBUG` flag coming from the environment.
    #[must_use]
    pub fn with_debug(self, debug: bool) -> Self {
        if debug && self == Self::Normal {
            Self::Verbose
        } else {
            self
        }
    }
}

/// Build the default filter directive for a verbosity.
fn default_directive(verbosity: Verbosity) -> String {
    format!("dronecot={}", verbosity.to_level_filter())
}

/// Initialize the logging system.
///
/// This should be called once at application startup. The logging level can be
/// controlled via:
/// 1. The `verbosity` parameter (`-v`, `-q`, or `DEBUG=1`)
/// 2. The `RUST_LOG` environment variable (takes precedence)
///
/// # Examples
///
/// ```no_run
/// use dronecot::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Normal.with_debug(true));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let default_filter = default_directive(verbosity);

    // Allow RUST_LOG to override
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Ignore the error if a subscriber is already set
    let _ = subscriber.try_init();
}
