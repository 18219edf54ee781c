//! Unified error types for swcache.
//!
//! Display strings carry a stable code prefix so hosts can match on them.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an unknown request mode).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Network request failed before a response arrived.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Network request timed out.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Response body exceeded the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Unusable HTTP status where a complete response was required.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A write targeted a store that does not exist.
    #[error("CACHE_ERROR: no store named {0}")]
    StoreMissing(String),

    /// A write targeted a store of a version that is no longer current.
    #[error("CACHE_ERROR: {0} belongs to a superseded version")]
    StoreRetired(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// The precache store could not be prepared.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),

    /// No activated worker controls the registration.
    #[error("NO_ACTIVE_WORKER")]
    NoActiveWorker,

    /// A background sync task failed and stays scheduled.
    #[error("SYNC_FAILED: {tag}: {reason}")]
    SyncFailed { tag: String, reason: String },
}

impl Error {
    /// Whether the failure came from the network rather than local state.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::Network(msg) => (-32008, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::HttpError(msg) => (-32009, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::StoreMissing(_) | Error::StoreRetired(_) => (-32002, err.to_string()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
            Error::InstallFailed(msg) => (-32020, msg.clone()),
            Error::NoActiveWorker => (-32021, "No active worker".to_string()),
            Error::SyncFailed { .. } => (-32022, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SyncFailed { tag: "sync-attendance".to_string(), reason: "offline".to_string() };
        assert!(err.to_string().starts_with("SYNC_FAILED"));
        assert!(err.to_string().contains("sync-attendance"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NoActiveWorker;
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32021);
    }

    #[test]
    fn test_is_network() {
        assert!(Error::Network("reset".into()).is_network());
        assert!(Error::FetchTimeout("20s".into()).is_network());
        assert!(!Error::NoActiveWorker.is_network());
    }
}
