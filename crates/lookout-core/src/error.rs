use thiserror::Error;

/// Top-level error type for the Lookout system.
///
/// Load-time failures (bad config, unreadable data files, schema violations)
/// all surface as `Config` and are fatal at startup. Subsystem crates keep
/// their own error types for recoverable failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LookoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("API error: {0}")]
    Api(String),
}

impl From<toml::de::Error> for LookoutError {
    fn from(err: toml::de::Error) -> Self {
        LookoutError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LookoutError {
    fn from(err: toml::ser::Error) -> Self {
        LookoutError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LookoutError {
    fn from(err: serde_json::Error) -> Self {
        LookoutError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for LookoutError {
    fn from(err: csv::Error) -> Self {
        LookoutError::Config(format!("CSV: {}", err))
    }
}

/// A specialized `Result` type for Lookout operations.
pub type Result<T> = std::result::Result<T, LookoutError>;
