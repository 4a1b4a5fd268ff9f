//! Long-running gateway workers.
//!
//! The gateway is three workers joined by bounded queues: the MQTT receiver,
//! the RID renderer and the TAK transmitter. [`WorkerSet`] runs them together
//! and stops everything as soon as one of them ends.

use std::fmt;
use std::future::Future;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// A task that runs until its input closes or it fails.
#[async_trait::async_trait]
pub trait Worker: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run the worker to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker cannot continue.
    async fn run(self: Box<Self>) -> Result<()>;
}

/// A collection of workers that live and die together.
#[derive(Default)]
pub struct WorkerSet {
    workers: Vec<Box<dyn Worker>>,
}

impl fmt::Debug for WorkerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSet")
            .field("workers", &self.names())
            .finish()
    }
}

impl WorkerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker.
    pub fn add(&mut self, worker: impl Worker + 'static) {
        self.workers.push(Box::new(worker));
    }

    /// Number of workers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.workers.len()
    }

    /// Names of the workers in start order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.workers.iter().map(|worker| worker.name()).collect()
    }

    /// Run every worker until one of them ends or `shutdown` completes.
    ///
    /// A worker that returns, even successfully, stops the whole set: the
    /// gateway cannot do its job with a piece missing.
    ///
    /// # Errors
    ///
    /// Returns the error of the first worker to fail, or an internal error
    /// when a worker stops early or panics.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        for worker in self.workers {
            let name = worker.name();
            info!(worker = name, "Starting worker");
            tasks.spawn(async move { (name, worker.run().await) });
        }

        let outcome = tokio::select! {
            () = shutdown => {
                info!("Shutdown requested");
                Ok(())
            }
            joined = tasks.join_next() => match joined {
                Some(Ok((name, Ok(())))) => {
                    warn!(worker = name, "Worker stopped");
                    Err(Error::internal(format!("worker {name} stopped unexpectedly")))
                }
                Some(Ok((name, Err(err)))) => {
                    error!(worker = name, error = %err, "Worker failed");
                    Err(err)
                }
                Some(Err(join_err)) => Err(Error::internal(format!("worker panicked: {join_err}"))),
                None => Ok(()),
            },
        };

        tasks.shutdown().await;
        outcome
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
