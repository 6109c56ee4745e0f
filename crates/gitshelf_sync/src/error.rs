//! Error types for replica synchronization.

use gitshelf_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while cloning or synchronizing a replica.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A repository command failed in a way that cannot be resolved by
    /// resetting to the remote head (network, authentication, missing
    /// branch, corrupt repository).
    #[error("repository failure during {operation}: {message}")]
    Repository {
        /// Repository operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// Persisting or reloading the collections failed.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// I/O error outside the store (lock file, working copy layout).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process is driving the same working copy.
    #[error("working copy is locked by another process: {}", .path.display())]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// The replica is not in a state that allows the requested step.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a repository failure.
    pub fn repository(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is an unrecoverable repository failure.
    pub fn is_repository_failure(&self) -> bool {
        matches!(self, SyncError::Repository { .. } | SyncError::Locked { .. })
    }

    /// Returns true if the error came from loading or persisting items.
    pub fn is_store_error(&self) -> bool {
        matches!(self, SyncError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors() {
        let err = SyncError::repository("clone", "could not resolve host");
        assert!(err.is_repository_failure());
        assert!(!err.is_store_error());
        assert_eq!(
            err.to_string(),
            "repository failure during clone: could not resolve host"
        );
    }

    #[test]
    fn store_errors() {
        let err = SyncError::from(CoreError::integrity("pets", "Taco", "invalid JSON"));
        assert!(err.is_store_error());
        assert!(!err.is_repository_failure());
    }
}
