//! Error types for gitshelf core.

use crate::schema::Violation;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in collection and store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error while reading or writing the backing directory.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background I/O task panicked or was cancelled.
    #[error("I/O task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The document does not carry the collection's identifier field.
    #[error("identifier field {field} not specified for collection {collection}")]
    MissingIdentifier {
        /// Collection the document was submitted to.
        collection: String,
        /// Name of the identifier field.
        field: String,
    },

    /// The identifier is not a string or cannot be used as a file name.
    #[error("invalid identifier {id} for collection {collection}: {reason}")]
    InvalidIdentifier {
        /// Collection the document was submitted to.
        collection: String,
        /// Rendered identifier value.
        id: String,
        /// Why the identifier was rejected.
        reason: String,
    },

    /// The document does not satisfy the collection's schema.
    #[error("schema violation in collection {collection}: {}", render_violations(.violations))]
    SchemaViolation {
        /// Collection whose schema rejected the document.
        collection: String,
        /// Every violation found.
        violations: Vec<Violation>,
    },

    /// An item with this identifier already exists.
    #[error("item {id} already exists in {collection}")]
    AlreadyExists {
        /// Collection name.
        collection: String,
        /// Conflicting identifier.
        id: String,
    },

    /// No item with this identifier exists.
    #[error("item {id} not found in {collection}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Missing identifier.
        id: String,
    },

    /// No collection with this name is registered in the store.
    #[error("collection not found: {name}")]
    UnknownCollection {
        /// Name of the collection.
        name: String,
    },

    /// An attachment field holds a value that cannot be written as a sidecar.
    #[error("attachment field {field} is invalid: {message}")]
    Attachment {
        /// Attachment field name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// An item on disk is unreadable or fails validation.
    #[error("integrity error in {collection}/{item}: {message}")]
    Integrity {
        /// Collection name.
        collection: String,
        /// Offending item (file or directory name).
        item: String,
        /// Description of the corruption.
        message: String,
    },

    /// The schema document itself is malformed.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an integrity error for an on-disk item.
    pub fn integrity(
        collection: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Integrity {
            collection: collection.into(),
            item: item.into(),
            message: message.into(),
        }
    }

    /// Creates an attachment error.
    pub fn attachment(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Attachment {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Returns true if this error was caused by the submitted document rather
    /// than by the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::MissingIdentifier { .. }
                | CoreError::InvalidIdentifier { .. }
                | CoreError::SchemaViolation { .. }
                | CoreError::AlreadyExists { .. }
                | CoreError::NotFound { .. }
                | CoreError::UnknownCollection { .. }
                | CoreError::Attachment { .. }
        )
    }
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(CoreError::not_found("pets", "Taco").is_client_error());
        assert!(!CoreError::integrity("pets", "Taco", "bad json").is_client_error());
        assert!(!CoreError::Io(io::Error::new(io::ErrorKind::Other, "disk")).is_client_error());
    }

    #[test]
    fn error_display() {
        let err = CoreError::SchemaViolation {
            collection: "pets".into(),
            violations: vec![
                Violation::new("/age", "expected number, found string"),
                Violation::new("", "missing required field owners"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("pets"));
        assert!(msg.contains("/age"));
        assert!(msg.contains("owners"));

        let err = CoreError::integrity("owners", "annie", "unreadable");
        assert_eq!(err.to_string(), "integrity error in owners/annie: unreadable");
    }
}
