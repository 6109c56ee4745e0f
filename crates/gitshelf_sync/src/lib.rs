//! # gitshelf sync
//!
//! Keeps a gitshelf working copy synchronized with its remote.
//!
//! This crate provides:
//! - Replica state machine (absent → cloned → synced ⇄ syncing)
//! - The [`Repository`] abstraction over version-control plumbing
//! - [`GitCli`], a backend driving the `git` binary
//! - [`MockRepository`], a scripted backend for tests
//!
//! ## Conflict policy
//!
//! The remote always wins. A pull that cannot fast-forward, or a push the
//! remote rejects, resets the working copy to the remote head. Local commits
//! are discarded and reported in [`SyncReport::conflicts`] instead of failing
//! the cycle. Only unrecoverable repository failures are errors.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod error;
mod git;
mod lock;
mod mock;
mod replica;
mod repository;

pub use config::ReplicaConfig;
pub use error::{SyncError, SyncResult};
pub use git::GitCli;
pub use lock::ReplicaLock;
pub use mock::{MockRepository, RepoCall, Scripted};
pub use replica::{ReplicaState, ReplicaSync, ResolvedConflict, SyncPhase, SyncReport, SyncStats};
pub use repository::{RepoOutcome, Repository};
