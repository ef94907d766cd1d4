use thiserror::Error;

/// Common error type for SIMPSS pipeline components.
///
/// Per-record variants (`Decode`, `UnknownSensor`, `InvalidRecord`) are
/// logged and the record dropped by the loops that hit them. Contract
/// variants (`ShapeMismatch`, `DuplicateName`, `NotConfigured`) indicate a
/// deployment error and are returned to the caller at setup time.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("No group mapping for sensor {0}")]
    UnknownSensor(String),

    #[error("Name mapping has {mapping} entries but record has {record} fields")]
    ShapeMismatch { mapping: usize, record: usize },

    #[error("Record is missing field '{0}'")]
    MissingField(String),

    #[error("Subscriber '{0}' is already registered")]
    DuplicateName(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Queue is full, record dropped")]
    QueueFull,

    #[error("Queue is closed")]
    QueueClosed,
}

impl Error {
    /// Whether this error concerns a single record rather than the setup.
    ///
    /// Loops drop the offending record and carry on for these.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Error::Decode(_)
                | Error::UnknownSensor(_)
                | Error::MissingField(_)
                | Error::InvalidRecord(_)
                | Error::QueueFull
        )
    }
}

/// Result type alias using the SIMPSS [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
