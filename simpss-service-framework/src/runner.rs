//! Service runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use simpss_common::{LoggingConfig, init_tracing};

use crate::ServiceArgs;
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};

/// Default time given to workers to unwind after shutdown is signalled.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Service runner that manages the lifecycle of a pipeline service.
///
/// Handles:
/// - Logging initialization
/// - Task spawning and supervision
/// - Cooperative shutdown through a `watch` channel
/// - Ctrl+C / SIGTERM handling
///
/// Workers receive a `watch::Receiver<bool>` from
/// [`shutdown_signal`](Self::shutdown_signal) and are expected to check it
/// at every loop iteration. A worker that exits on its own also triggers
/// shutdown of the whole service.
///
/// # Example
///
/// ```ignore
/// use simpss_service_framework::{ServiceArgs, ServiceConfig, ServiceRunner, parse_args};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args: ServiceArgs = parse_args("myservice.json5");
///     let config = MyServiceConfig::load(&args.config)?;
///
///     let mut runner = ServiceRunner::new_with_args("myservice", config, Some(&args))?;
///
///     let shutdown = runner.shutdown_signal();
///     runner.spawn_with_error("worker", async move { my_worker(shutdown).await });
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct ServiceRunner<C: ServiceConfig> {
    /// Service name for logging.
    name: String,
    /// Service version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Broadcasts `true` once shutdown starts.
    shutdown_tx: watch::Sender<bool>,
    /// Workers report their name here when they exit.
    exit_tx: mpsc::UnboundedSender<String>,
    exit_rx: mpsc::UnboundedReceiver<String>,
    /// Spawned tasks.
    tasks: Vec<(String, JoinHandle<()>)>,
    /// How long to wait for each worker during shutdown.
    shutdown_timeout: Duration,
}

impl<C: ServiceConfig> ServiceRunner<C> {
    /// Create a new service runner and initialize logging from the config.
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new service runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&ServiceArgs>,
    ) -> Result<Self> {
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config)?;

        let runner = Self::without_tracing(name, config);
        info!(service = %runner.name, version = %runner.version, "Starting service");
        Ok(runner)
    }

    /// Create a runner without touching the global tracing subscriber.
    pub(crate) fn without_tracing(name: impl Into<String>, config: C) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            shutdown_tx,
            exit_tx,
            exit_rx,
            tasks: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set how long each worker gets to stop after shutdown is signalled.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Get the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the service version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a receiver that flips to `true` when shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn an async worker task that returns a Result.
    ///
    /// Errors are logged automatically.
    pub fn spawn_with_error<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let worker = name.clone();
        let exit_tx = self.exit_tx.clone();

        let handle = tokio::spawn(async move {
            match future.await {
                Ok(()) => debug!(worker = %worker, "Worker finished"),
                Err(e) => error!(worker = %worker, error = %e, "Worker failed"),
            }
            let _ = exit_tx.send(worker);
        });
        self.tasks.push((name, handle));
    }

    /// Spawn a synchronous worker on the blocking thread pool.
    ///
    /// Use this for loops that block on client polling.
    pub fn spawn_blocking_with_error<F, E>(&mut self, name: impl Into<String>, work: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let worker = name.clone();
        let exit_tx = self.exit_tx.clone();

        let handle = tokio::task::spawn_blocking(move || {
            match work() {
                Ok(()) => debug!(worker = %worker, "Worker finished"),
                Err(e) => error!(worker = %worker, error = %e, "Worker failed"),
            }
            let _ = exit_tx.send(worker);
        });
        self.tasks.push((name, handle));
    }

    /// Run the service until a shutdown signal arrives or a worker exits.
    ///
    /// This will:
    /// 1. Wait for Ctrl+C, SIGTERM or the first worker exit
    /// 2. Broadcast shutdown to all workers
    /// 3. Wait for each worker, up to the shutdown timeout
    pub async fn run(mut self) -> Result<()> {
        info!(
            service = %self.name,
            tasks = self.tasks.len(),
            "Service running. Press Ctrl+C to stop."
        );

        tokio::select! {
            _ = wait_for_shutdown_signal() => {
                info!(service = %self.name, "Received shutdown signal");
            }
            Some(worker) = self.exit_rx.recv() => {
                warn!(service = %self.name, worker = %worker, "Worker exited, shutting down");
            }
        }

        // Receivers may already be gone if every worker has exited.
        let _ = self.shutdown_tx.send(true);

        let mut stuck = Vec::new();
        for (worker, handle) in self.tasks {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker = %worker, error = %e, "Worker panicked"),
                Err(_) => {
                    warn!(worker = %worker, "Worker did not stop in time");
                    stuck.push(worker);
                }
            }
        }

        info!(service = %self.name, "Goodbye!");

        if stuck.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::worker(format!(
                "workers did not stop in time: {}",
                stuck.join(", ")
            )))
        }
    }

    /// [`run`](Self::run), then call `report` whether or not every worker
    /// stopped in time.
    pub async fn run_and_report<F: FnOnce()>(self, report: F) -> Result<()> {
        let outcome = self.run().await;
        report();
        outcome
    }
}

/// Wait until the process receives Ctrl+C or, on Unix, SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
