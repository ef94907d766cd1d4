//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{ServiceError, Result};

/// Trait for service configuration types.
///
/// Implement this trait for a service's configuration struct to get
/// loading, validation, and access to the logging section.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use simpss_service_framework::{LoggingConfig, ServiceConfig, ServiceError};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyServiceConfig {
///     pub logging: LoggingConfig,
///     pub topic: String,
/// }
///
/// impl ServiceConfig for MyServiceConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<(), ServiceError> {
///         if self.topic.is_empty() {
///             return Err(ServiceError::validation("topic must not be empty"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ServiceConfig: Sized + DeserializeOwned {
    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse and validate configuration from a JSON5 string.
    fn from_json5(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ServiceError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json5(&content)
    }
}
