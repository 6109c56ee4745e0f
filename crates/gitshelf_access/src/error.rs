//! Error types for access control.

use crate::operation::Operation;
use gitshelf_core::CoreError;
use std::io;
use thiserror::Error;

/// Result type for access control operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors that can occur while authenticating, authorizing or transforming.
#[derive(Debug, Error)]
pub enum AccessError {
    /// An operation name in the configuration is not one of
    /// get, post, put, patch or delete.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// The offending name.
        name: String,
    },

    /// The API configuration is malformed.
    #[error("invalid API configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A custom authentication strategy failed.
    #[error("authentication strategy {strategy} failed: {message}")]
    Authentication {
        /// Name of the strategy.
        strategy: String,
        /// Error message.
        message: String,
    },

    /// The access rule denied the operation, or the operation is not exposed.
    #[error("{operation} on {collection} is not authorized")]
    Unauthorized {
        /// Collection name.
        collection: String,
        /// Denied operation.
        operation: Operation,
    },

    /// A middleware rejected or failed to transform the document.
    #[error("middleware failed on {collection}: {message}")]
    Middleware {
        /// Collection whose middleware failed.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Reading another collection failed.
    #[error("store error: {0}")]
    Core(#[from] CoreError),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AccessError {
    /// Creates an unauthorized error.
    pub fn unauthorized(collection: impl Into<String>, operation: Operation) -> Self {
        Self::Unauthorized {
            collection: collection.into(),
            operation,
        }
    }

    /// Creates a middleware error.
    pub fn middleware(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Middleware {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if the error is attributable to the caller.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AccessError::Unauthorized { .. } | AccessError::Middleware { .. }
        )
    }
}
