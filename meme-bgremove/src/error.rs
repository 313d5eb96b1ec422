//! Error types for background removal.

use thiserror::Error;

/// Errors a segmentation service can fail with.
///
/// The pipeline hands these back to its caller exactly as the service
/// produced them.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// The configured service URL is invalid.
    #[error("invalid segmentation endpoint: {0}")]
    InvalidEndpoint(String),

    /// HTTP layer failed (connection refused, reset, TLS, body read).
    #[error("segmentation request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service could not handle the image it was given.
    #[error("unsupported input image: {0}")]
    UnsupportedInput(String),

    /// The service answered with an error status.
    #[error("segmentation service error {status}: {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Any other failure reported by a service implementation.
    #[error("segmentation backend error: {0}")]
    Backend(String),
}

impl SegmentationError {
    /// Create a backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an unsupported input error.
    pub fn unsupported_input<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedInput(msg.into())
    }
}
