//! Common error types for SODAV Monitor

use thiserror::Error;

/// Common result type for SODAV Monitor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the detection pipeline core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
