//! Error taxonomy for backend operations.
//!
//! Errors carry a closed set of kinds so callers can match
//! programmatically, plus optional operation/backend context added at
//! the point of failure. `kind()` drills through the context wrapper,
//! so a wrapped `NotFound` still matches as `NotFound`.

use std::fmt;

use thiserror::Error;

use crate::cache::CacheError;

/// The entity kind an operation was acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// An SSH server record.
    Server,
    /// A project record.
    Project,
    /// A credential record.
    Credential,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Server => "server",
            Self::Project => "project",
            Self::Credential => "credential",
        };
        f.write_str(name)
    }
}

/// Classified error kind, independent of context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend is closed or unreachable.
    Unavailable,
    /// Requested entity does not exist.
    NotFound,
    /// Write attempted against an unsupported entity kind.
    ReadOnly,
    /// Input failed validation (missing linkage, empty fields).
    Validation,
    /// An entity with the same id already exists.
    DuplicateId,
    /// The external client failed.
    Client,
    /// The fallback cache failed.
    Cache,
}

/// Errors produced by backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend has been closed or cannot be reached.
    #[error("backend is closed or unreachable")]
    Unavailable,

    /// The requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind looked up.
        kind: EntityKind,
        /// Identifier that missed.
        id: String,
    },

    /// The backend does not support writes for this entity kind.
    #[error("{kind} entries are read-only on this backend")]
    ReadOnly {
        /// Entity kind the write targeted.
        kind: EntityKind,
    },

    /// The input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An entity with this id already exists.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// The external client reported a failure. The message is kept
    /// verbatim; the sync status classifier inspects it.
    #[error("client error: {0}")]
    Client(String),

    /// The fallback cache failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A failure wrapped with the operation name and backend identity.
    #[error("{backend}: {op}: {source}")]
    Op {
        /// Identity string of the failing backend.
        backend: String,
        /// Name of the failing operation.
        op: &'static str,
        /// Underlying error.
        #[source]
        source: Box<BackendError>,
    },
}

impl BackendError {
    /// Convenience constructor for a not-found error.
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Wraps the error with the failing operation and backend identity.
    #[must_use]
    pub fn context(self, backend: &str, op: &'static str) -> Self {
        Self::Op {
            backend: backend.to_string(),
            op,
            source: Box::new(self),
        }
    }

    /// Returns the classified kind, unwrapping any context layers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable => ErrorKind::Unavailable,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
            Self::Validation(_) => ErrorKind::Validation,
            Self::DuplicateId(_) => ErrorKind::DuplicateId,
            Self::Client(_) => ErrorKind::Client,
            Self::Cache(_) => ErrorKind::Cache,
            Self::Op { source, .. } => source.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_drills_through_context() {
        let err = BackendError::not_found(EntityKind::Server, "srv1")
            .context("vault", "get_server")
            .context("multi", "get_server");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_context_appears_in_message() {
        let err = BackendError::Unavailable.context("vault", "sync");
        let msg = err.to_string();
        assert!(msg.contains("vault"));
        assert!(msg.contains("sync"));
        assert!(msg.contains("closed or unreachable"));
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Server.to_string(), "server");
        assert_eq!(
            BackendError::ReadOnly {
                kind: EntityKind::Project
            }
            .to_string(),
            "project entries are read-only on this backend"
        );
    }
}
