//! Error types for mountstream
//!
//! Defines crate-wide error types using thiserror for clear error propagation.
//!
//! Most resolution failures in the device layer are recoverable degradations
//! and are handled internally (logged, best-effort result returned); the
//! variants here cover the cases that genuinely must reach the caller.

use thiserror::Error;

/// Main error type for the mountstream crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A device handler factory claimed a device but could not produce a handle
    #[error("Device handler error: {0}")]
    DeviceHandler(String),

    /// A read was attempted with no transfer open
    #[error("No transfer is open")]
    NotOpen,

    /// The transfer was closed or replaced while a read was blocked on it
    #[error("Transfer closed or replaced during read")]
    StreamInvalidated,

    /// The transfer completed and all buffered bytes have been drained
    #[error("End of stream")]
    EndOfStream,

    /// The transport job reported a failure
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the mountstream Error
pub type Result<T> = std::result::Result<T, Error>;
