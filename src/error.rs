//! Error types for scan submission, report validation and export.

use thiserror::Error;

/// A payload that does not have the shape of a scan report.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("report does not match the expected shape: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("unique_vulnerabilities ({unique}) exceeds total_vulnerabilities ({total})")]
    UniqueExceedsTotal { unique: u64, total: u64 },
}

/// Failure of a single scan submission. Display text is user-facing.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Please enter a valid URL.")]
    InvalidInput,

    #[error("{0}")]
    RemoteRejected(String),

    #[error("Scan service returned a malformed report: {0}")]
    MalformedResponse(#[from] ValidationError),

    #[error("Scan request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure of a JSON or HTML export. Display text is user-facing.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to generate JSON download: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    #[error("{0}")]
    RemoteRejected(String),

    #[error("HTML report request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("An HTML export is already in progress")]
    AlreadyPending,

    #[error("Failed to save report file: {0}")]
    Save(#[from] std::io::Error),
}
