//! Common error types for Dozy

use thiserror::Error;

/// Common result type for Dozy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Dozy crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings store read/write error
    #[error("Settings error: {0}")]
    Settings(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error (TOML/JSON)
    #[error("Serialization error: {0}")]
    Serialization(String),
}
