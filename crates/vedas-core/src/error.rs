use thiserror::Error;

/// Top-level error type for the Vedas chat client.
///
/// Subsystem crates define their own error types where callers need to
/// branch on the failure; everything that only needs to be reported ends up
/// here so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VedasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for VedasError {
    fn from(err: toml::de::Error) -> Self {
        VedasError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VedasError {
    fn from(err: toml::ser::Error) -> Self {
        VedasError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VedasError {
    fn from(err: serde_json::Error) -> Self {
        VedasError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Vedas operations.
pub type Result<T> = std::result::Result<T, VedasError>;
