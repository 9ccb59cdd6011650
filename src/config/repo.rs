//! Per-repository settings stored in git config.
//!
//! Keys live under `githooks.<repo-root>.<option>`, so one user-level git
//! config can carry settings for many repositories. This module only reads
//! them.

use crate::core::error::{Error, Result};
use crate::core::git::GitCommand;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Recognized repository options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOption {
    /// Where the rules live.
    HooksPath,
    /// Executable that replaces the rules entirely.
    Script,
    /// Executables run before the rules (multi-valued).
    PreRunExecute,
    /// Executables run after the rules (multi-valued).
    PostRunExecute,
}

impl RepoOption {
    /// Every option.
    pub const ALL: [Self; 4] = [
        Self::HooksPath,
        Self::Script,
        Self::PreRunExecute,
        Self::PostRunExecute,
    ];

    /// Key suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HooksPath => "hooks-path",
            Self::Script => "script",
            Self::PreRunExecute => "pre-run-execute",
            Self::PostRunExecute => "post-run-execute",
        }
    }

    /// Whether the option may hold several values.
    #[must_use]
    pub const fn is_multi(self) -> bool {
        matches!(self, Self::PreRunExecute | Self::PostRunExecute)
    }
}

impl fmt::Display for RepoOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Single-valued option.
    Single(String),
    /// Multi-valued option.
    List(Vec<String>),
}

impl ConfigValue {
    /// All values, in order.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Single(v) => vec![v.clone()],
            Self::List(vs) => vs.clone(),
        }
    }
}

/// Read-only view of a repository's `githooks.*` settings.
pub struct RepoConfig<'a> {
    git: &'a dyn GitCommand,
    root: PathBuf,
}

impl fmt::Debug for RepoConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoConfig")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<'a> RepoConfig<'a> {
    /// Creates a view for the repository at `root`.
    pub fn new(git: &'a dyn GitCommand, root: &Path) -> Self {
        Self {
            git,
            root: root.to_path_buf(),
        }
    }

    /// Full git-config key for an option.
    #[must_use]
    pub fn key(&self, option: RepoOption) -> String {
        format!("githooks.{}.{}", self.root.display(), option.as_str())
    }

    /// Reads an option; `None` when it is not set.
    pub fn get(&self, option: RepoOption) -> Result<Option<ConfigValue>> {
        let key = self.key(option);
        let output = self.git.output(&["config", "--get-all", &key])?;

        match output.status {
            0 => {},
            // Exit 1 means the key is not set.
            1 => return Ok(None),
            _ => {
                return Err(Error::git(
                    format!("config --get-all {key}"),
                    output.stderr.trim().to_string(),
                ))
            },
        }

        let mut values: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();

        Ok(match values.len() {
            0 => None,
            _ if option.is_multi() => Some(ConfigValue::List(values)),
            // Single-valued options take the last setting, as git does.
            _ => values.pop().map(ConfigValue::Single),
        })
    }

    /// Directory or file holding the rules.
    pub fn hooks_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.single(RepoOption::HooksPath)?.map(|p| self.resolve(&p)))
    }

    /// Executable that replaces the rules.
    pub fn script(&self) -> Result<Option<PathBuf>> {
        Ok(self.single(RepoOption::Script)?.map(|p| self.resolve(&p)))
    }

    /// Executables to run before the rules.
    pub fn pre_run_execute(&self) -> Result<Vec<PathBuf>> {
        self.paths(RepoOption::PreRunExecute)
    }

    /// Executables to run after the rules.
    pub fn post_run_execute(&self) -> Result<Vec<PathBuf>> {
        self.paths(RepoOption::PostRunExecute)
    }

    fn single(&self, option: RepoOption) -> Result<Option<String>> {
        Ok(self.get(option)?.and_then(|v| v.values().pop()))
    }

    fn paths(&self, option: RepoOption) -> Result<Vec<PathBuf>> {
        Ok(self
            .get(option)?
            .map(|v| v.values())
            .unwrap_or_default()
            .iter()
            .map(|p| self.resolve(p))
            .collect())
    }

    /// Relative paths are taken from the repository root.
    fn resolve(&self, value: &str) -> PathBuf {
        let path = PathBuf::from(value);
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::git::testing::FakeGit;
    use crate::core::git::GitRepo;
    use pretty_assertions::assert_eq;
    use std::process::Command;

    const ROOT: &str = "/work/app";

    fn key(option: &str) -> String {
        format!("config --get-all githooks.{ROOT}.{option}")
    }

    #[test]
    fn test_key_format() {
        let git = FakeGit::new();
        let config = RepoConfig::new(&git, Path::new(ROOT));
        assert_eq!(
            config.key(RepoOption::PreRunExecute),
            "githooks./work/app.pre-run-execute"
        );
    }

    #[test]
    fn test_unset_option_is_none() {
        let git = FakeGit::new();
        let config = RepoConfig::new(&git, Path::new(ROOT));
        assert_eq!(config.get(RepoOption::Script).expect("get"), None);
        assert!(config.pre_run_execute().expect("get").is_empty());
    }

    #[test]
    fn test_multi_valued_option() {
        let git = FakeGit::new().ok(&key("pre-run-execute"), "bin/setup\n/usr/local/bin/prep\n");
        let config = RepoConfig::new(&git, Path::new(ROOT));

        assert_eq!(
            config.get(RepoOption::PreRunExecute).expect("get"),
            Some(ConfigValue::List(vec![
                "bin/setup".to_string(),
                "/usr/local/bin/prep".to_string()
            ]))
        );
        assert_eq!(
            config.pre_run_execute().expect("paths"),
            vec![
                PathBuf::from("/work/app/bin/setup"),
                PathBuf::from("/usr/local/bin/prep")
            ]
        );
    }

    #[test]
    fn test_single_valued_option_takes_last() {
        let git = FakeGit::new().ok(&key("hooks-path"), "old/hooks\nnew/hooks\n");
        let config = RepoConfig::new(&git, Path::new(ROOT));

        assert_eq!(
            config.get(RepoOption::HooksPath).expect("get"),
            Some(ConfigValue::Single("new/hooks".to_string()))
        );
        assert_eq!(
            config.hooks_path().expect("path"),
            Some(PathBuf::from("/work/app/new/hooks"))
        );
    }

    #[test]
    fn test_git_failure_is_error() {
        let git = FakeGit::new().fail(&key("script"), "fatal: bad config file");
        let config = RepoConfig::new(&git, Path::new(ROOT));
        assert!(matches!(
            config.script(),
            Err(Error::GitOperation { .. })
        ));
    }

    #[test]
    fn test_reads_real_git_config() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        Command::new("git")
            .args(["init"])
            .current_dir(temp.path())
            .output()
            .expect("init repo");
        let repo = GitRepo::discover_from(temp.path()).expect("discover");

        let config = RepoConfig::new(&repo, repo.root());
        let key = config.key(RepoOption::PostRunExecute);
        for value in ["/bin/true", "/bin/echo"] {
            Command::new("git")
                .args(["config", "--add", &key, value])
                .current_dir(temp.path())
                .output()
                .expect("set config");
        }

        assert_eq!(
            config.post_run_execute().expect("paths"),
            vec![PathBuf::from("/bin/true"), PathBuf::from("/bin/echo")]
        );
    }
}
