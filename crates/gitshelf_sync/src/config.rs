//! Configuration for a replica.

use std::path::{Path, PathBuf};

/// Where a working copy comes from and how commits are made in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaConfig {
    /// URL (or path) of the remote repository.
    pub remote_url: String,
    /// Branch that is cloned, pulled and pushed.
    pub branch: String,
    /// Local directory of the working copy.
    pub directory: PathBuf,
    /// Path inside the working copy that holds the collections.
    /// Only this path is staged and cleaned.
    pub tracked_path: String,
    /// Message of the commits created by a sync.
    pub commit_message: String,
    /// Author name of the commits created by a sync.
    pub author_name: String,
    /// Author email of the commits created by a sync.
    pub author_email: String,
    /// The git executable.
    pub git_binary: PathBuf,
}

impl ReplicaConfig {
    /// Creates a configuration with the default commit settings.
    pub fn new(
        remote_url: impl Into<String>,
        branch: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote_url: remote_url.into(),
            branch: branch.into(),
            directory: directory.into(),
            tracked_path: "gitshelf".into(),
            commit_message: "Edits".into(),
            author_name: "gitshelf".into(),
            author_email: "gitshelf@localhost".into(),
            git_binary: PathBuf::from("git"),
        }
    }

    /// Sets the tracked path.
    pub fn with_tracked_path(mut self, path: impl Into<String>) -> Self {
        self.tracked_path = path.into();
        self
    }

    /// Sets the commit message.
    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    /// Sets the commit author.
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Sets the git executable.
    pub fn with_git_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.git_binary = binary.into();
        self
    }

    /// Returns the directory holding the collections.
    pub fn store_root(&self) -> PathBuf {
        self.directory.join(&self.tracked_path)
    }

    /// Returns the path of the advisory lock guarding the working copy.
    ///
    /// The lock lives next to the working copy so it never shows up in it.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .directory
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "replica".into());
        name.push(".lock");
        match self.directory.parent() {
            Some(parent) => parent.join(name),
            None => Path::new(".").join(name),
        }
    }
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self::new("", "master", "replica")
    }
}
