//! Error types for the detection pipeline core

use thiserror::Error;

/// Pipeline-level error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying shared error (DB, config, ...)
    #[error(transparent)]
    Common(#[from] sodav_common::Error),

    /// Stream capture failed for reasons other than silence/boundary termination
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Feature extraction could not run
    #[error("Feature extraction failed: {0}")]
    Extraction(String),

    /// External recognizer call failed
    #[error("Recognizer error ({source}): {message}")]
    Recognizer { source: &'static str, message: String },

    /// HTTP client error talking to an external recognizer
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
