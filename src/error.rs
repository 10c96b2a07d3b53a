//! Error types for the tiered storage layer
//!
//! Internal error type used at backend boundaries and constructors. Public
//! adapter operations never surface these across the storage trait: failures
//! are caught at the adapter boundary and encoded into
//! `StorageResult.success`/`error`.

use thiserror::Error;

/// Unified error type for the storage layer
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Object-Cache Backend Errors
    // =========================================================================
    #[error("Cache transport error: {0}")]
    CacheTransport(#[from] reqwest::Error),

    #[error("Cache protocol error: status {status}: {message}")]
    CacheProtocol { status: u16, message: String },

    // =========================================================================
    // Relational Backend Errors
    // =========================================================================
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend unavailable: {backend}")]
    BackendUnavailable { backend: String },

    #[error("Backend operation failed: {backend} - {operation}: {reason}")]
    BackendOperationFailed {
        backend: String,
        operation: String,
        reason: String,
    },

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the storage layer
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BackendOperationFailed {
            backend: "sqlite".into(),
            operation: "put".into(),
            reason: "table locked".into(),
        };
        assert_eq!(
            err.to_string(),
            "Backend operation failed: sqlite - put: table locked"
        );

        let err = Error::BackendUnavailable {
            backend: "object-cache".into(),
        };
        assert_eq!(err.to_string(), "Backend unavailable: object-cache");
    }

    #[test]
    fn test_from_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::JsonParse(_)));
    }
}
