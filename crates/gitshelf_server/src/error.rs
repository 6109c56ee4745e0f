//! Error types for the operation binding.

use gitshelf_access::AccessError;
use gitshelf_core::CoreError;
use gitshelf_sync::SyncError;
use std::fmt;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned to the routing layer.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The call itself is malformed (missing body, mismatched identifier).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Collection or validation error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Authentication, authorization or middleware error.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Replica synchronization error.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Classification of a failed (or warned) operation.
///
/// The routing layer maps kinds to transport responses, for example
/// `NotFound` to 404 and `Unauthorized` to 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The document lacks the identifier field.
    MissingIdentifier,
    /// The document fails the collection schema.
    SchemaViolation,
    /// `post` of an identifier that already exists.
    AlreadyExists,
    /// Unknown item or collection.
    NotFound,
    /// The access rule denied the operation.
    Unauthorized,
    /// A custom authentication strategy failed.
    AuthenticationError,
    /// A sync hit divergence and reset to the remote head. Only ever a
    /// warning, see [`crate::Response::warning`].
    ConflictResolved,
    /// Clone, pull or push failed for good.
    RepositoryFailure,
    /// An item on disk is corrupt.
    IntegrityError,
    /// The call is malformed.
    InvalidRequest,
    /// Anything else: local I/O, configuration, task failures.
    Internal,
}

impl ErrorKind {
    /// Returns the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingIdentifier => "MissingIdentifier",
            ErrorKind::SchemaViolation => "SchemaViolation",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::AuthenticationError => "AuthenticationError",
            ErrorKind::ConflictResolved => "ConflictResolved",
            ErrorKind::RepositoryFailure => "RepositoryFailure",
            ErrorKind::IntegrityError => "IntegrityError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Returns true if the caller can fix the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingIdentifier
                | ErrorKind::SchemaViolation
                | ErrorKind::AlreadyExists
                | ErrorKind::NotFound
                | ErrorKind::Unauthorized
                | ErrorKind::InvalidRequest
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerError {
    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServerError::Core(e) => core_kind(e),
            ServerError::Access(e) => access_kind(e),
            ServerError::Sync(e) => sync_kind(e),
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.kind().is_client_error()
    }
}

fn core_kind(error: &CoreError) -> ErrorKind {
    match error {
        CoreError::MissingIdentifier { .. } => ErrorKind::MissingIdentifier,
        CoreError::SchemaViolation { .. } | CoreError::Attachment { .. } => {
            ErrorKind::SchemaViolation
        }
        CoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
        CoreError::NotFound { .. } | CoreError::UnknownCollection { .. } => ErrorKind::NotFound,
        CoreError::InvalidIdentifier { .. } => ErrorKind::InvalidRequest,
        CoreError::Integrity { .. } => ErrorKind::IntegrityError,
        CoreError::Io(_)
        | CoreError::Json(_)
        | CoreError::Task(_)
        | CoreError::InvalidSchema { .. } => ErrorKind::Internal,
    }
}

fn access_kind(error: &AccessError) -> ErrorKind {
    match error {
        AccessError::Unauthorized { .. } => ErrorKind::Unauthorized,
        AccessError::Authentication { .. } => ErrorKind::AuthenticationError,
        AccessError::Middleware { .. } => ErrorKind::InvalidRequest,
        AccessError::Core(e) => core_kind(e),
        AccessError::UnknownOperation { .. }
        | AccessError::InvalidConfig { .. }
        | AccessError::Io(_)
        | AccessError::Json(_) => ErrorKind::Internal,
    }
}

fn sync_kind(error: &SyncError) -> ErrorKind {
    match error {
        SyncError::Repository { .. } | SyncError::Locked { .. } => ErrorKind::RepositoryFailure,
        SyncError::Store(e) => core_kind(e),
        SyncError::Io(_) | SyncError::InvalidStateTransition { .. } => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitshelf_access::Operation;

    #[test]
    fn kinds_follow_the_source_error() {
        let err = ServerError::from(CoreError::not_found("pets", "Taco"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_client_error());

        let err = ServerError::from(AccessError::unauthorized("pets", Operation::Patch));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.to_string(), "patch on pets is not authorized");

        let err = ServerError::from(SyncError::repository("push", "connection refused"));
        assert_eq!(err.kind(), ErrorKind::RepositoryFailure);
        assert!(!err.is_client_error());

        let err = ServerError::from(SyncError::Store(CoreError::integrity(
            "pets", "Taco", "bad json",
        )));
        assert_eq!(err.kind(), ErrorKind::IntegrityError);

        let err = ServerError::from(AccessError::Core(CoreError::MissingIdentifier {
            collection: "pets".into(),
            field: "name".into(),
        }));
        assert_eq!(err.kind(), ErrorKind::MissingIdentifier);
    }

    #[test]
    fn kind_names() {
        assert_eq!(ErrorKind::ConflictResolved.to_string(), "ConflictResolved");
        assert_eq!(
            ServerError::invalid_request("missing body").kind(),
            ErrorKind::InvalidRequest
        );
    }
}
