//! Replica state machine.
//!
//! ```text
//! Absent ──clone──▶ Cloned ──▶ Synced ◀──▶ Syncing
//!                                 │           │
//!                                 └── Error ◀─┘
//! ```
//!
//! A sync cycle persists pending edits, commits, pulls, pushes and reloads
//! every collection. Divergence on pull or push is resolved by resetting to
//! the remote head: the remote always wins and the lost local edits are
//! reported as [`ResolvedConflict`]s.

use crate::config::ReplicaConfig;
use crate::error::{SyncError, SyncResult};
use crate::lock::ReplicaLock;
use crate::repository::{RepoOutcome, Repository};
use gitshelf_core::Store;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The lifecycle state of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    /// No working copy has been set up yet.
    Absent,
    /// The remote was just cloned.
    Cloned,
    /// A sync cycle is running.
    Syncing,
    /// The working copy matches the remote as of the last cycle.
    Synced,
    /// The last operation failed.
    Error,
}

impl ReplicaState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, ReplicaState::Syncing)
    }

    /// Returns true if a new sync cycle may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(
            self,
            ReplicaState::Cloned | ReplicaState::Synced | ReplicaState::Error
        )
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Step of a cycle at which divergence was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// While pulling remote history.
    Pull,
    /// While pushing local history.
    Push,
}

/// Divergence that was resolved by resetting to the remote head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConflict {
    /// Where the divergence showed up.
    pub phase: SyncPhase,
    /// What the repository reported.
    pub message: String,
}

impl fmt::Display for ResolvedConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} conflict resolved by resetting to the remote head: {}",
            self.phase, self.message
        )
    }
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Whether local edits produced a commit.
    pub committed: bool,
    /// Conflicts resolved during the cycle.
    pub conflicts: Vec<ResolvedConflict>,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if local edits were discarded in favor of the remote.
    pub fn had_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Number of completed cycles.
    pub cycles_completed: u64,
    /// Number of conflicts resolved by reset.
    pub conflicts_resolved: u64,
    /// Number of failed clones, pulls and cycles.
    pub failures: u64,
    /// Completion time of the last successful cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Keeps one working copy in step with its remote.
pub struct ReplicaSync<R: Repository> {
    config: ReplicaConfig,
    repository: Arc<R>,
    state: RwLock<ReplicaState>,
    stats: RwLock<SyncStats>,
    lock: Mutex<Option<ReplicaLock>>,
}

impl<R: Repository> ReplicaSync<R> {
    /// Creates a replica in the `Absent` state.
    pub fn new(config: ReplicaConfig, repository: R) -> Self {
        Self {
            config,
            repository: Arc::new(repository),
            state: RwLock::new(ReplicaState::Absent),
            stats: RwLock::new(SyncStats::default()),
            lock: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Returns the repository backend.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Gets the current state.
    pub fn state(&self) -> ReplicaState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: ReplicaState) {
        debug!(?state, "Replica state changed");
        *self.state.write() = state;
    }

    /// Makes sure a working copy exists and is up to date.
    ///
    /// Takes the working-copy lock on first use and keeps it for the life of
    /// the replica. Clones when there is no working copy, pulls otherwise;
    /// a diverged pull is resolved by resetting to the remote head.
    pub async fn ensure_local(&self) -> SyncResult<Vec<ResolvedConflict>> {
        if self.state().is_active() {
            return Err(SyncError::InvalidStateTransition {
                from: self.state().to_string(),
                to: ReplicaState::Synced.to_string(),
            });
        }

        match self.bring_up().await {
            Ok(conflicts) => {
                self.set_state(ReplicaState::Synced);
                Ok(conflicts)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    async fn bring_up(&self) -> SyncResult<Vec<ResolvedConflict>> {
        self.acquire_lock()?;

        let mut conflicts = Vec::new();
        if self.repository.exists_locally(&self.config).await? {
            info!(directory = %self.config.directory.display(), "Pulling existing working copy");
            if let RepoOutcome::Conflict(message) = self.repository.pull(&self.config).await? {
                self.reset_to_remote(SyncPhase::Pull, message, &mut conflicts)
                    .await?;
            }
        } else {
            info!(
                remote = %self.config.remote_url,
                branch = %self.config.branch,
                directory = %self.config.directory.display(),
                "Cloning remote"
            );
            self.repository.clone_remote(&self.config).await?;
            self.set_state(ReplicaState::Cloned);
        }
        Ok(conflicts)
    }

    fn acquire_lock(&self) -> SyncResult<()> {
        let mut held = self.lock.lock();
        if held.is_none() {
            *held = Some(ReplicaLock::acquire(&self.config.lock_path())?);
        }
        Ok(())
    }

    /// Runs one sync cycle against `store`.
    ///
    /// 1. persist pending edits of every collection
    /// 2. commit the tracked path
    /// 3. pull; on divergence reset to the remote head
    /// 4. push; on rejection reset to the remote head
    /// 5. reload every collection from the working copy
    ///
    /// Resolved conflicts are reported, not returned as errors. Any other
    /// failure aborts the cycle and leaves the replica in `Error`.
    pub async fn sync(&self, store: &mut Store) -> SyncResult<SyncReport> {
        let start = Instant::now();

        let state = self.state();
        if !state.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: ReplicaState::Syncing.to_string(),
            });
        }
        self.set_state(ReplicaState::Syncing);

        match self.run_cycle(store).await {
            Ok((committed, conflicts)) => {
                self.set_state(ReplicaState::Synced);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                let report = SyncReport {
                    committed,
                    conflicts,
                    duration: start.elapsed(),
                };
                info!(
                    committed = report.committed,
                    conflicts = report.conflicts.len(),
                    duration_ms = report.duration.as_millis() as u64,
                    "Sync cycle completed"
                );
                Ok(report)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    async fn run_cycle(&self, store: &mut Store) -> SyncResult<(bool, Vec<ResolvedConflict>)> {
        store.persist_pending().await?;

        let committed = self
            .repository
            .commit(&self.config, &self.config.commit_message)
            .await?;

        let mut conflicts = Vec::new();
        if let RepoOutcome::Conflict(message) = self.repository.pull(&self.config).await? {
            self.reset_to_remote(SyncPhase::Pull, message, &mut conflicts)
                .await?;
        }
        if let RepoOutcome::Conflict(message) = self.repository.push(&self.config).await? {
            self.reset_to_remote(SyncPhase::Push, message, &mut conflicts)
                .await?;
        }

        store.reload_all().await?;
        Ok((committed, conflicts))
    }

    async fn reset_to_remote(
        &self,
        phase: SyncPhase,
        message: String,
        conflicts: &mut Vec<ResolvedConflict>,
    ) -> SyncResult<()> {
        self.repository
            .hard_reset_to_remote_head(&self.config)
            .await?;

        let conflict = ResolvedConflict { phase, message };
        warn!(
            phase = ?conflict.phase,
            branch = %self.config.branch,
            message = %conflict.message,
            "Local history diverged; reset to the remote head"
        );
        self.stats.write().conflicts_resolved += 1;
        conflicts.push(conflict);
        Ok(())
    }

    fn handle_error(&self, error: &SyncError) {
        warn!(error = %error, "Replica operation failed");
        self.set_state(ReplicaState::Error);
        let mut stats = self.stats.write();
        stats.failures += 1;
        stats.last_error = Some(error.to_string());
    }
}
