//! Git repository operations.
//!
//! [`GitRepo`] is the repository context: it resolves the repository root
//! and issues git subprocess calls on behalf of the manifest builder and the
//! repository config reader. Both consume it through the [`GitCommand`]
//! trait so tests can substitute canned git output.

use crate::core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Exit code (`-1` if the process was killed by a signal).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl GitOutput {
    /// Returns true if git exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }
}

/// Shell execution primitive for git, rooted at a repository.
pub trait GitCommand {
    /// Runs `git <args>` and returns its captured output regardless of status.
    fn output(&self, args: &[&str]) -> Result<GitOutput>;

    /// Runs `git <args>` and returns stdout, failing on a non-zero status.
    fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::git(args.join(" "), output.stderr.trim().to_string()))
        }
    }
}

/// Represents a Git repository.
#[derive(Debug, Clone)]
pub struct GitRepo {
    /// Root directory of the repository (the work tree top level).
    root: PathBuf,
    /// Path to the .git directory (or file for worktrees).
    git_dir: PathBuf,
}

impl GitRepo {
    /// Discovers the Git repository from the current directory.
    pub fn discover() -> Result<Self> {
        Self::discover_from(&std::env::current_dir().map_err(|e| Error::io("get current dir", e))?)
    }

    /// Discovers the Git repository from a specific path.
    pub fn discover_from(path: &Path) -> Result<Self> {
        let not_a_repo = || Error::NotGitRepo {
            path: path.to_path_buf(),
        };

        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel", "--git-dir"])
            .current_dir(path)
            .output()
            .map_err(|e| Error::io("run git rev-parse", e))?;

        if !output.status.success() {
            return Err(not_a_repo());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();

        let root = lines.next().map(PathBuf::from).ok_or_else(not_a_repo)?;

        let git_dir = lines
            .next()
            .map(|s| {
                let p = PathBuf::from(s);
                if p.is_absolute() {
                    p
                } else {
                    path.join(p)
                }
            })
            .ok_or_else(not_a_repo)?;

        Ok(Self { root, git_dir })
    }

    /// Returns the root directory of the repository.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .git directory path.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

impl GitCommand for GitRepo {
    fn output(&self, args: &[&str]) -> Result<GitOutput> {
        tracing::debug!(root = %self.root.display(), args = %args.join(" "), "running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::io(format!("run git {}", args.join(" ")), e))?;

        Ok(GitOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
