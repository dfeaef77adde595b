//! Error types for the vault simulator

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the vault simulator
#[derive(Error, Debug)]
pub enum Error {
    // Business-rule rejections
    #[error("Invalid amount: {0} (must be a finite number greater than zero)")]
    InvalidAmount(f64),

    #[error("Insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: f64, requested: f64 },

    #[error("Auto-compound requires a positive balance")]
    AutoCompoundRequiresFunds,

    // Persistence errors
    #[error("Persistence read failed: {0}")]
    PersistenceRead(String),

    #[error("Persistence write failed: {0}")]
    PersistenceWrite(String),

    // Remote balance query errors
    #[error("Balance query failed: {0}")]
    RemoteQuery(String),

    #[error("Address must not be empty")]
    InvalidAddress,

    #[error("A balance query is already in flight")]
    QueryInFlight,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Scheduler needs a tokio runtime to spawn onto
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

impl Error {
    /// Check if this error is a business-rule rejection (state left untouched)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InsufficientBalance { .. }
                | Error::AutoCompoundRequiresFunds
        )
    }

    /// Check if this error is transient (storage or network)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::PersistenceRead(_)
                | Error::PersistenceWrite(_)
                | Error::RemoteQuery(_)
                | Error::QueryInFlight
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteQuery(e.to_string())
    }
}
