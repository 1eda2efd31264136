//! Error types for Vendor Pulse

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while computing a report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid vendorId '{0}' (expected 24-character ObjectId hex)")]
    InvalidVendorId(String),

    #[error("{0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse snapshot: {0}")]
    SnapshotError(String),

    #[error("Document store error: {0}")]
    StoreError(String),

    #[error("Report computation exceeded {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl ReportError {
    /// True for errors caused by the caller's input rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReportError::InvalidVendorId(_)
                | ReportError::MissingParameter(_)
                | ReportError::InvalidParameter(_)
        )
    }

    /// HTTP status a web layer should answer with
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}
