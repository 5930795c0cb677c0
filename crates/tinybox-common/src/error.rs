//! Unified error types for the tinybox workspace.
//!
//! Every fallible operation in the workspace returns [`Result`]; the
//! variants mirror the failure classes of the runtime (bad CLI input,
//! missing on-disk records, kernel interface failures, and so on).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TinyboxError {
    /// A flag or argument is missing or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the offending input.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A resource with the same identity already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Type of the duplicated resource.
        kind: &'static str,
        /// Identifier of the duplicated resource.
        id: String,
    },

    /// A finite resource pool is exhausted.
    #[error("resources exhausted: {message}")]
    ResourceExhausted {
        /// Description of the exhausted pool.
        message: String,
    },

    /// A kernel interface call failed (mount, clone, netlink, ...).
    #[error("system call failed: {message}")]
    Syscall {
        /// Description of the failed operation.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// An operation would violate a lifecycle invariant.
    #[error("{message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TinyboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_kind_and_id() {
        let err = TinyboxError::NotFound {
            kind: "container",
            id: "c1".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("container"));
        assert!(msg.contains("c1"));
    }

    #[test]
    fn already_exists_display() {
        let err = TinyboxError::AlreadyExists {
            kind: "network",
            id: "br0".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("network"));
        assert!(msg.contains("br0"));
    }

    #[test]
    fn invariant_violation_display_is_verbatim() {
        let err = TinyboxError::InvariantViolation {
            message: "please stop container c1 first".into(),
        };
        assert_eq!(format!("{err}"), "please stop container c1 first");
    }

    #[test]
    fn serialization_error_from_serde_json() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: TinyboxError = serde_err.into();
        assert!(matches!(err, TinyboxError::Serialization { .. }));
    }
}
