//! Test fixtures backed by real `git` repositories.
//!
//! [`TempRemote`] creates a bare repository with one seeded commit on a
//! chosen branch, plus a private "other replica" clone that tests use to
//! push competing history.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const AUTHOR: [&str; 6] = [
    "-c",
    "user.name=gitshelf-testkit",
    "-c",
    "user.email=testkit@gitshelf.invalid",
    "-c",
    "commit.gpgsign=false",
];

/// Returns true if a usable `git` binary is on the `PATH`.
///
/// Tests that need real repositories return early when this is false.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Runs `git` in `dir` and returns its trimmed stdout.
///
/// # Panics
///
/// Panics if git cannot be spawned or exits unsuccessfully.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(AUTHOR)
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Returns the commit `HEAD` points to in a working copy.
pub fn head_of(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}

/// Returns true if the working copy has no uncommitted or untracked changes.
pub fn is_clean(dir: &Path) -> bool {
    git(dir, &["status", "--porcelain"]).is_empty()
}

/// A temporary bare remote seeded with one commit.
pub struct TempRemote {
    temp_dir: TempDir,
    branch: String,
}

impl TempRemote {
    /// Creates a bare remote whose `branch` holds a single README commit.
    pub fn new(branch: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();

        git(root, &["init", "--bare", "--quiet", "remote.git"]);
        let head = format!("refs/heads/{branch}");
        git(&root.join("remote.git"), &["symbolic-ref", "HEAD", &head]);

        git(root, &["init", "--quiet", "other"]);
        let other = root.join("other");
        git(&other, &["symbolic-ref", "HEAD", &head]);
        let url = root.join("remote.git").display().to_string();
        git(&other, &["remote", "add", "origin", &url]);
        fs::write(other.join("README.md"), "# petstore\n").expect("Failed to write README");
        git(&other, &["add", "-A"]);
        git(&other, &["commit", "--quiet", "-m", "Initial commit"]);
        git(&other, &["push", "--quiet", "origin", branch]);

        Self {
            temp_dir,
            branch: branch.to_string(),
        }
    }

    /// Returns the URL to clone from.
    pub fn url(&self) -> String {
        self.remote_dir().display().to_string()
    }

    /// Returns the branch name.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Returns a fresh path inside the fixture for a working copy.
    ///
    /// The directory itself is not created.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("scratch").join(name)
    }

    /// Returns the commit the remote branch points to.
    pub fn head(&self) -> String {
        let reference = format!("refs/heads/{}", self.branch);
        git(&self.remote_dir(), &["rev-parse", &reference])
    }

    /// Commits `files` from the other replica and pushes them.
    ///
    /// The other replica first catches up with the remote, so the push
    /// always fast-forwards. Paths are relative to the repository root.
    pub fn push_files(&self, files: &[(&str, &str)], message: &str) -> String {
        let other = self.other_dir();
        git(&other, &["fetch", "--quiet", "origin", &self.branch]);
        let upstream = format!("origin/{}", self.branch);
        git(&other, &["reset", "--quiet", "--hard", &upstream]);

        for (path, contents) in files {
            let path = other.join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create directory");
            }
            fs::write(&path, contents).expect("Failed to write file");
        }
        git(&other, &["add", "-A"]);
        git(&other, &["commit", "--quiet", "-m", message]);
        git(&other, &["push", "--quiet", "origin", &self.branch]);
        self.head()
    }

    /// Lists the files tracked by the remote branch.
    pub fn tracked_files(&self) -> Vec<String> {
        git(
            &self.remote_dir(),
            &["ls-tree", "-r", "--name-only", &self.branch],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }

    fn remote_dir(&self) -> PathBuf {
        self.temp_dir.path().join("remote.git")
    }

    fn other_dir(&self) -> PathBuf {
        self.temp_dir.path().join("other")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_is_seeded() {
        if !git_available() {
            return;
        }
        let remote = TempRemote::new("testbranch");
        assert_eq!(remote.tracked_files(), vec!["README.md".to_string()]);
        assert_eq!(remote.branch(), "testbranch");
    }

    #[test]
    fn test_push_files_moves_head() {
        if !git_available() {
            return;
        }
        let remote = TempRemote::new("testbranch");
        let before = remote.head();
        let after = remote.push_files(&[("gitshelf/pets/Lucy/_item.json", "{}\n")], "Add Lucy");

        assert_ne!(before, after);
        assert!(remote
            .tracked_files()
            .contains(&"gitshelf/pets/Lucy/_item.json".to_string()));
    }
}
