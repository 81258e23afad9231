//! Error types for inventory access, scan jobs and result persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by an inventory backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Transport failure before the backend answered.
    #[error("Inventory endpoint unreachable: {0}")]
    Unreachable(String),

    /// Credentials were refused.
    #[error("Authentication rejected: {0}")]
    Authentication(String),

    /// Non-success answer with the backend's status and message.
    #[error("Inventory backend returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// The backend answered with something we could not interpret.
    #[error("Unexpected inventory response: {0}")]
    Protocol(String),

    /// The per-VM extraction context could not be opened.
    #[error("Failed to open VM: {0}")]
    VmOpen(String),

    /// One category could not be extracted.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Used after [`close`](crate::inventory::InventorySession::close).
    #[error("Inventory session already closed")]
    Closed,
}

impl From<reqwest::Error> for InventoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Protocol(err.to_string())
        } else if err.is_status() {
            Self::Remote {
                status: err.status().map(|s| s.as_u16()).unwrap_or_default(),
                message: err.to_string(),
            }
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

/// Job-scoped failures. Anything narrower than this is recorded in the
/// result document instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to establish inventory session: {0}")]
    Connection(#[source] InventoryError),

    #[error("Failed to enumerate virtual machines: {0}")]
    Enumeration(#[source] InventoryError),

    /// Shutdown was requested before the result was persisted.
    #[error("Scan interrupted by shutdown")]
    Interrupted,

    #[error("Failed to persist scan result: {0}")]
    Store(#[from] StoreError),

    /// The scan task panicked or was aborted.
    #[error("Scan task terminated abnormally: {0}")]
    TaskFailed(String),
}

/// Failures reading or writing the persisted result.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
