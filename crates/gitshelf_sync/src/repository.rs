//! Repository plumbing abstraction.

use crate::config::ReplicaConfig;
use crate::error::SyncResult;
use async_trait::async_trait;

/// Outcome of an operation that exchanges history with the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// The operation completed.
    Applied,
    /// Local and remote history diverged; the message describes how.
    Conflict(String),
}

impl RepoOutcome {
    /// Returns true if the outcome is a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepoOutcome::Conflict(_))
    }
}

/// The version-control operations a replica needs.
///
/// Implementations treat each call as an atomic black box with three
/// outcomes: success, [`RepoOutcome::Conflict`] where history diverged, or
/// an `Err` for failures that resetting cannot fix.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Returns true if a working copy exists at the configured directory.
    async fn exists_locally(&self, config: &ReplicaConfig) -> SyncResult<bool>;

    /// Clones the configured branch of the remote into the directory.
    async fn clone_remote(&self, config: &ReplicaConfig) -> SyncResult<()>;

    /// Stages the tracked path and commits it.
    ///
    /// Returns false if there was nothing to commit.
    async fn commit(&self, config: &ReplicaConfig, message: &str) -> SyncResult<bool>;

    /// Brings in remote history without ever creating a merge commit.
    async fn pull(&self, config: &ReplicaConfig) -> SyncResult<RepoOutcome>;

    /// Publishes local history to the remote branch.
    async fn push(&self, config: &ReplicaConfig) -> SyncResult<RepoOutcome>;

    /// Discards local commits and changes under the tracked path, leaving
    /// the working copy at the remote head.
    async fn hard_reset_to_remote_head(&self, config: &ReplicaConfig) -> SyncResult<()>;
}
