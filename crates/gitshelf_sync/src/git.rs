//! [`Repository`] implementation that shells out to the `git` binary.

use crate::config::ReplicaConfig;
use crate::error::{SyncError, SyncResult};
use crate::repository::{RepoOutcome, Repository};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Markers in `git push` output that mean the remote moved on.
const PUSH_REJECTED: [&str; 3] = ["rejected", "non-fast-forward", "fetch first"];

/// Marker in `git add` output for a tracked path with no files yet.
const UNMATCHED_PATHSPEC: &str = "did not match any files";

/// Marker in `git fetch` output for a branch that does not exist yet.
const MISSING_REMOTE_REF: &str = "couldn't find remote ref";

/// Captured result of one git invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    code: Option<i32>,
    stderr: String,
}

impl GitOutput {
    fn into_result(self, operation: &str) -> SyncResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(SyncError::repository(operation, self.stderr))
        }
    }
}

/// Drives a working copy through the `git` command line.
///
/// Every command runs non-interactively with the configured author, so a
/// missing credential fails instead of waiting for a prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    /// Creates a git CLI backend.
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        config: &ReplicaConfig,
        dir: &Path,
        operation: &str,
        args: &[&str],
    ) -> SyncResult<GitOutput> {
        debug!(operation, ?args, dir = %dir.display(), "Running git");

        let output = Command::new(&config.git_binary)
            .arg("-c")
            .arg(format!("user.name={}", config.author_name))
            .arg("-c")
            .arg(format!("user.email={}", config.author_email))
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                SyncError::repository(
                    operation,
                    format!("failed to run {}: {e}", config.git_binary.display()),
                )
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            debug!(operation, code = ?output.status.code(), %stderr, "git exited unsuccessfully");
        }
        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr,
        })
    }

    async fn fetch(&self, config: &ReplicaConfig, operation: &str) -> SyncResult<bool> {
        let output = self
            .run(
                config,
                &config.directory,
                operation,
                &["fetch", "--quiet", "origin", &config.branch],
            )
            .await?;
        if output.success {
            Ok(true)
        } else if output.stderr.contains(MISSING_REMOTE_REF) {
            Ok(false)
        } else {
            Err(SyncError::repository(operation, output.stderr))
        }
    }
}

#[async_trait]
impl Repository for GitCli {
    async fn exists_locally(&self, config: &ReplicaConfig) -> SyncResult<bool> {
        Ok(fs::metadata(config.directory.join(".git")).await.is_ok())
    }

    async fn clone_remote(&self, config: &ReplicaConfig) -> SyncResult<()> {
        let parent = match config.directory.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        fs::create_dir_all(&parent).await?;

        // Relative to `parent`, which is the working directory of the command.
        let directory = config
            .directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.directory.display().to_string());
        self.run(
            config,
            &parent,
            "clone",
            &[
                "clone",
                "--quiet",
                "--branch",
                &config.branch,
                &config.remote_url,
                &directory,
            ],
        )
        .await?
        .into_result("clone")
    }

    async fn commit(&self, config: &ReplicaConfig, message: &str) -> SyncResult<bool> {
        let dir = &config.directory;
        let staged = self
            .run(config, dir, "commit", &["add", "-A", "--", &config.tracked_path])
            .await?;
        if !staged.success {
            // A pathspec that matches nothing on disk or in the index.
            if staged.stderr.contains(UNMATCHED_PATHSPEC)
                || fs::metadata(dir.join(&config.tracked_path)).await.is_err()
            {
                return Ok(false);
            }
            return Err(SyncError::repository("commit", staged.stderr));
        }

        let diff = self
            .run(config, dir, "commit", &["diff", "--cached", "--quiet"])
            .await?;
        match diff.code {
            Some(0) => return Ok(false),
            Some(1) => {}
            _ => return Err(SyncError::repository("commit", diff.stderr)),
        }

        self.run(config, dir, "commit", &["commit", "--quiet", "-m", message])
            .await?
            .into_result("commit")?;
        Ok(true)
    }

    async fn pull(&self, config: &ReplicaConfig) -> SyncResult<RepoOutcome> {
        if !self.fetch(config, "pull").await? {
            return Ok(RepoOutcome::Applied);
        }

        let upstream = format!("origin/{}", config.branch);
        let merge = self
            .run(
                config,
                &config.directory,
                "pull",
                &["merge", "--ff-only", "--quiet", &upstream],
            )
            .await?;
        if merge.success {
            Ok(RepoOutcome::Applied)
        } else {
            Ok(RepoOutcome::Conflict(merge.stderr))
        }
    }

    async fn push(&self, config: &ReplicaConfig) -> SyncResult<RepoOutcome> {
        let refspec = format!("HEAD:{}", config.branch);
        let output = self
            .run(
                config,
                &config.directory,
                "push",
                &["push", "origin", &refspec],
            )
            .await?;
        if output.success {
            Ok(RepoOutcome::Applied)
        } else if PUSH_REJECTED.iter().any(|m| output.stderr.contains(m)) {
            Ok(RepoOutcome::Conflict(output.stderr))
        } else {
            Err(SyncError::repository("push", output.stderr))
        }
    }

    async fn hard_reset_to_remote_head(&self, config: &ReplicaConfig) -> SyncResult<()> {
        if !self.fetch(config, "reset").await? {
            return Err(SyncError::repository(
                "reset",
                format!("remote branch {} does not exist", config.branch),
            ));
        }

        let dir = &config.directory;
        let upstream = format!("origin/{}", config.branch);
        self.run(config, dir, "reset", &["reset", "--quiet", "--hard", &upstream])
            .await?
            .into_result("reset")?;
        self.run(
            config,
            dir,
            "reset",
            &["clean", "-f", "-d", "--quiet", "--", &config.tracked_path],
        )
        .await?
        .into_result("reset")
    }
}
