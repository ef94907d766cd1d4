//! SIMPSS Service Framework
//!
//! Common lifecycle scaffolding for the SIMPSS pipeline services.
//!
//! # Overview
//!
//! This framework provides:
//! - [`ServiceConfig`] trait for configuration loading and validation
//! - [`ServiceRunner`] for managing service lifecycle (startup, shutdown, signal handling)
//! - [`ServiceArgs`] and [`parse_args`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use simpss_service_framework::{ServiceArgs, ServiceConfig, ServiceRunner, parse_args};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args: ServiceArgs = parse_args("myservice.json5");
//!     let config = MyServiceConfig::load(&args.config)?;
//!
//!     let mut runner = ServiceRunner::new_with_args("myservice", config, Some(&args))?;
//!
//!     // Spawn service-specific workers
//!     let shutdown = runner.shutdown_signal();
//!     runner.spawn_with_error("worker", my_worker(shutdown));
//!
//!     // Run until Ctrl+C
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod runner;

pub use args::{ServiceArgs, parse_args};
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use runner::{DEFAULT_SHUTDOWN_TIMEOUT, ServiceRunner, wait_for_shutdown_signal};

// Re-export commonly used types from simpss-common
pub use simpss_common::{KafkaConfig, LogFormat, LoggingConfig, SensorGroupsConfig};
