//! Error type definitions for the playlist core
//!
//! This module defines the error taxonomy shared by the parser, fetcher,
//! store and scheduler.

use thiserror::Error;

/// Top-level application error type
///
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// The document could not be parsed as an M3U playlist
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Fetching the playlist failed (timeout, DNS, connection, non-2xx status)
    #[error("Network error: {url} - {message}")]
    Network { url: String, message: String },

    /// A playlist with the same source URL is already tracked
    #[error("Playlist already exists for source: {source_url}")]
    Duplicate { source_url: String },

    /// Invalid configuration value (e.g. an update interval outside the allowed set)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid user input
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Persistence layer specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failures
    #[error("I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Data serialization/deserialization failures
    #[error("Serialization failed for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a network error for a specific URL
    pub fn network<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate source error
    pub fn duplicate<S: Into<String>>(source_url: S) -> Self {
        Self::Duplicate {
            source_url: source_url.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error came from the network layer
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl StorageError {
    /// Create an I/O error for a path
    pub fn io<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error for a storage key
    pub fn serialization<K: Into<String>>(key: K, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AppError::network("http://example.com/list.m3u", "HTTP status 404");
        assert_eq!(
            err.to_string(),
            "Network error: http://example.com/list.m3u - HTTP status 404"
        );
        assert!(err.is_network());

        let err = AppError::duplicate("http://example.com/list.m3u");
        assert!(err.to_string().contains("already exists"));
        assert!(!err.is_network());
    }

    #[test]
    fn test_storage_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = StorageError::io("/tmp/playlists.json", io).into();
        assert!(matches!(err, AppError::Storage(StorageError::Io { .. })));
    }
}
