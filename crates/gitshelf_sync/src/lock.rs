//! Advisory lock that keeps a working copy single-writer.

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive lock on a working copy, released on drop.
///
/// The lock file sits next to the working copy rather than inside it so it
/// is never staged, cleaned or reset away.
#[derive(Debug)]
pub struct ReplicaLock {
    path: PathBuf,
    _file: File,
}

impl ReplicaLock {
    /// Acquires the lock at `path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Locked`] if another holder exists.
    pub fn acquire(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::Locked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Returns the path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
