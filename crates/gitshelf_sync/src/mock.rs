//! Scripted [`Repository`] for tests.

use crate::config::ReplicaConfig;
use crate::error::{SyncError, SyncResult};
use crate::repository::{RepoOutcome, Repository};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A call received by [`MockRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    /// `exists_locally`
    ExistsLocally,
    /// `clone_remote`
    Clone,
    /// `commit` with its message
    Commit(String),
    /// `pull`
    Pull,
    /// `push`
    Push,
    /// `hard_reset_to_remote_head`
    HardReset,
}

/// A scripted result for pull or push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Succeed.
    Applied,
    /// Report diverged history.
    Conflict(String),
    /// Fail with a repository error.
    Fail(String),
}

/// A repository whose outcomes are set up front.
///
/// Pulls and pushes consume scripted outcomes in order and succeed once the
/// script runs out. Every call is recorded.
#[derive(Debug, Default)]
pub struct MockRepository {
    exists: AtomicBool,
    has_changes: AtomicBool,
    clone_failure: Mutex<Option<String>>,
    reset_failure: Mutex<Option<String>>,
    pulls: Mutex<VecDeque<Scripted>>,
    pushes: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RepoCall>>,
}

impl MockRepository {
    /// Creates a mock without a local working copy.
    pub fn new() -> Self {
        Self {
            has_changes: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Creates a mock whose working copy already exists.
    pub fn existing() -> Self {
        let mock = Self::new();
        mock.exists.store(true, Ordering::SeqCst);
        mock
    }

    /// Sets whether `commit` finds something to commit.
    pub fn set_has_changes(&self, has_changes: bool) {
        self.has_changes.store(has_changes, Ordering::SeqCst);
    }

    /// Makes `clone_remote` fail.
    pub fn fail_clone(&self, message: impl Into<String>) {
        *self.clone_failure.lock() = Some(message.into());
    }

    /// Makes `hard_reset_to_remote_head` fail.
    pub fn fail_reset(&self, message: impl Into<String>) {
        *self.reset_failure.lock() = Some(message.into());
    }

    /// Queues the outcome of the next unscripted pull.
    pub fn script_pull(&self, outcome: Scripted) {
        self.pulls.lock().push_back(outcome);
    }

    /// Queues the outcome of the next unscripted push.
    pub fn script_push(&self, outcome: Scripted) {
        self.pushes.lock().push_back(outcome);
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: RepoCall) {
        self.calls.lock().push(call);
    }

    fn play(operation: &str, script: &Mutex<VecDeque<Scripted>>) -> SyncResult<RepoOutcome> {
        match script.lock().pop_front() {
            None | Some(Scripted::Applied) => Ok(RepoOutcome::Applied),
            Some(Scripted::Conflict(message)) => Ok(RepoOutcome::Conflict(message)),
            Some(Scripted::Fail(message)) => Err(SyncError::repository(operation, message)),
        }
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn exists_locally(&self, _config: &ReplicaConfig) -> SyncResult<bool> {
        self.record(RepoCall::ExistsLocally);
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn clone_remote(&self, _config: &ReplicaConfig) -> SyncResult<()> {
        self.record(RepoCall::Clone);
        if let Some(message) = self.clone_failure.lock().clone() {
            return Err(SyncError::repository("clone", message));
        }
        self.exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self, _config: &ReplicaConfig, message: &str) -> SyncResult<bool> {
        self.record(RepoCall::Commit(message.to_string()));
        Ok(self.has_changes.load(Ordering::SeqCst))
    }

    async fn pull(&self, _config: &ReplicaConfig) -> SyncResult<RepoOutcome> {
        self.record(RepoCall::Pull);
        Self::play("pull", &self.pulls)
    }

    async fn push(&self, _config: &ReplicaConfig) -> SyncResult<RepoOutcome> {
        self.record(RepoCall::Push);
        Self::play("push", &self.pushes)
    }

    async fn hard_reset_to_remote_head(&self, _config: &ReplicaConfig) -> SyncResult<()> {
        self.record(RepoCall::HardReset);
        match self.reset_failure.lock().clone() {
            Some(message) => Err(SyncError::repository("reset", message)),
            None => Ok(()),
        }
    }
}
