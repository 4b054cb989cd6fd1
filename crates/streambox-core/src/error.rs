//! Unified error type for the streambox application.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for API handlers to derive an HTTP status code via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in streambox.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media item", "source").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller presented credentials that are invalid or insufficient.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting resource already exists, or an exclusive operation is
    /// already running (duplicate username, scan busy).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote source (FTP, SMB, UPnP) failed.
    #[error("Upstream error [{source_name}]: {message}")]
    Upstream {
        /// The remote endpoint or protocol that failed.
        source_name: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external encoder process exited abnormally.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// A retryable failure (idle-timeout reconnect, transient socket error).
    #[error("Transient error: {0}")]
    Transient(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::Upstream { .. } => 502,
            Error::EncodeFailed(_) => 500,
            Error::Transient(_) => 503,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Upstream`].
    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Upstream {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("media item", 42);
        assert_eq!(err.to_string(), "media item not found: 42");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = Error::Conflict("scan already running".into());
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn upstream_display() {
        let err = Error::upstream("ftp://nas", "connection refused");
        assert_eq!(
            err.to_string(),
            "Upstream error [ftp://nas]: connection refused"
        );
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn transient_maps_to_503() {
        let err = Error::Transient("idle timeout".into());
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn encode_failed_display() {
        let err = Error::EncodeFailed("ffmpeg exited with status 1".into());
        assert!(err.to_string().contains("ffmpeg"));
        assert_eq!(err.http_status(), 500);
    }
}
