//! Change manifests.
//!
//! A [`Manifest`] is the de-duplicated, path-ordered set of
//! [`ChangeRecord`]s a hook run operates over. [`Manifest::build`] assembles
//! it from git: the staged and/or unstaged raw diffs first, then the tracked
//! and untracked listings for paths not already present. Every query uses
//! `-z` so paths arrive unquoted.

use crate::core::change::ChangeRecord;
use crate::core::error::{Error, Result};
use crate::core::git::GitCommand;
use crate::core::limiter::Limiter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default comparison reference.
pub const DEFAULT_REF: &str = "HEAD";

/// Git's well-known empty tree, used when `HEAD` does not exist yet.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Which sources feed a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ManifestOptions {
    /// Index against the reference (`git diff-index --cached <ref>`).
    pub staged: bool,
    /// Working tree against the index (`git diff-files`).
    pub unstaged: bool,
    /// Every tracked file (`git ls-files`).
    pub tracked: bool,
    /// Every untracked, non-ignored file (`git ls-files --others`).
    pub untracked: bool,
    /// Comparison reference for the staged diff; `HEAD` when unset.
    pub reference: Option<String>,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            staged: true,
            unstaged: false,
            tracked: false,
            untracked: false,
            reference: None,
        }
    }
}

impl ManifestOptions {
    /// Sets the comparison reference.
    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Ordered set of change records, unique by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    records: Vec<ChangeRecord>,
}

impl Manifest {
    /// Builds a manifest from records; later duplicates of a path are dropped.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = ChangeRecord>) -> Self {
        let mut by_path: BTreeMap<String, ChangeRecord> = BTreeMap::new();
        for record in records {
            by_path.entry(record.path().to_string()).or_insert(record);
        }
        Self {
            records: by_path.into_values().collect(),
        }
    }

    /// Queries git according to `options` and builds the manifest.
    ///
    /// Any failing git invocation aborts with [`Error::ManifestUnavailable`].
    pub fn build(git: &dyn GitCommand, root: &Path, options: &ManifestOptions) -> Result<Self> {
        let mut records = Vec::new();

        if options.staged {
            let reference = resolve_reference(git, options.reference.as_deref());
            records.extend(diff(
                git,
                &["diff-index", "-z", "-C", "-M", "-B", "--cached", &reference],
            )?);
        }

        if options.unstaged {
            records.extend(diff(git, &["diff-files", "-z", "-C", "-M", "-B"])?);
        }

        if options.tracked {
            records.extend(listing(git, root, &["ls-files", "-z", "--exclude-standard"], true)?);
        }

        if options.untracked {
            records.extend(listing(
                git,
                root,
                &["ls-files", "-z", "--others", "--exclude-standard"],
                false,
            )?);
        }

        let manifest = Self::new(records);
        tracing::debug!(files = manifest.len(), "manifest built");
        Ok(manifest)
    }

    /// Returns a copy containing only records that satisfy every limiter.
    #[must_use]
    pub fn filter<'a>(&self, limiters: impl IntoIterator<Item = &'a Limiter> + Clone) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|record| limiters.clone().into_iter().all(|l| l.trace(record)))
                .cloned()
                .collect(),
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in path order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }

    /// Looks up a record by its resolved path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ChangeRecord> {
        self.records
            .binary_search_by(|r| r.path().cmp(path))
            .ok()
            .map(|i| &self.records[i])
    }

    /// Resolved paths in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.records.iter().map(|r| r.path().to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Picks the reference to diff the index against.
///
/// An explicit reference is used as-is. The default `HEAD` falls back to the
/// empty tree when the repository has no commits yet.
fn resolve_reference(git: &dyn GitCommand, reference: Option<&str>) -> String {
    if let Some(reference) = reference {
        return reference.to_string();
    }

    match git.output(&["rev-parse", "--verify", "--quiet", "HEAD"]) {
        Ok(out) if out.success() => DEFAULT_REF.to_string(),
        _ => {
            tracing::debug!("HEAD does not resolve; diffing against the empty tree");
            EMPTY_TREE.to_string()
        },
    }
}

fn run(git: &dyn GitCommand, args: &[&str]) -> Result<String> {
    git.git(args).map_err(|e| Error::ManifestUnavailable {
        command: args.join(" "),
        message: match e {
            Error::GitOperation { message, .. } => message,
            other => other.to_string(),
        },
    })
}

fn diff(git: &dyn GitCommand, args: &[&str]) -> Result<Vec<ChangeRecord>> {
    ChangeRecord::parse_nul_stream(&run(git, args)?)
}

fn listing(
    git: &dyn GitCommand,
    root: &Path,
    args: &[&str],
    tracked: bool,
) -> Result<Vec<ChangeRecord>> {
    let output = run(git, args)?;
    let mut records = Vec::new();

    for path in output.split('\0').filter(|p| !p.is_empty()) {
        // Listed paths can vanish before we stat them.
        if !root.join(path).is_file() {
            tracing::debug!(path, "skipping listed path that is not a regular file");
            continue;
        }
        records.push(ChangeRecord::from_working_tree(root, path, tracked)?);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change::ChangeType;
    use crate::core::git::testing::FakeGit;
    use crate::core::git::GitRepo;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const STAGED: &str = "diff-index -z -C -M -B --cached HEAD";
    const UNSTAGED: &str = "diff-files -z -C -M -B";
    const TRACKED: &str = "ls-files -z --exclude-standard";
    const UNTRACKED: &str = "ls-files -z --others --exclude-standard";
    const HEAD_CHECK: &str = "rev-parse --verify --quiet HEAD";

    fn scratch(files: &[&str]) -> TempDir {
        let temp = TempDir::new().expect("create temp dir");
        for file in files {
            let path = temp.path().join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(path, "content\n").expect("write");
        }
        temp
    }

    fn staged_only() -> ManifestOptions {
        ManifestOptions::default()
    }

    #[test]
    fn test_build_staged() {
        let temp = scratch(&[]);
        let git = FakeGit::new().ok(HEAD_CHECK, "abc\n").ok(
            STAGED,
            ":100644 100644 1111 2222 M\0src/b.rs\0:000000 100644 0000 3333 A\0src/a.rs\0",
        );

        let manifest = Manifest::build(&git, temp.path(), &staged_only()).expect("build");
        assert_eq!(manifest.paths(), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(
            manifest.get("src/a.rs").map(|r| r.change_type),
            Some(ChangeType::Added)
        );
    }

    #[test]
    fn test_build_without_head_uses_empty_tree() {
        let temp = scratch(&[]);
        let git = FakeGit::new().ok(
            &format!("diff-index -z -C -M -B --cached {EMPTY_TREE}"),
            ":000000 100644 0000 3333 A\0first.txt\0",
        );

        let manifest = Manifest::build(&git, temp.path(), &staged_only()).expect("build");
        assert_eq!(manifest.paths(), vec!["first.txt"]);
    }

    #[test]
    fn test_build_with_explicit_reference_skips_head_check() {
        let temp = scratch(&[]);
        let git = FakeGit::new().ok(
            "diff-index -z -C -M -B --cached origin/main",
            ":100644 100644 1111 2222 M\0lib.rs\0",
        );

        let options = staged_only().reference("origin/main");
        let manifest = Manifest::build(&git, temp.path(), &options).expect("build");
        assert_eq!(manifest.len(), 1);
        assert!(!git.calls.borrow().iter().any(|c| c == HEAD_CHECK));
    }

    #[test]
    fn test_staged_takes_precedence_over_untracked_and_tracked() {
        let temp = scratch(&["app.rb", "new.rb", "other.rb"]);
        let git = FakeGit::new()
            .ok(HEAD_CHECK, "abc\n")
            .ok(STAGED, ":100644 100644 1111 2222 M\0app.rb\0")
            .ok(TRACKED, "app.rb\0other.rb\0")
            .ok(UNTRACKED, "new.rb\0app.rb\0");

        let options = ManifestOptions {
            tracked: true,
            untracked: true,
            ..ManifestOptions::default()
        };
        let manifest = Manifest::build(&git, temp.path(), &options).expect("build");

        assert_eq!(manifest.paths(), vec!["app.rb", "new.rb", "other.rb"]);
        assert_eq!(
            manifest.get("app.rb").map(|r| r.change_type),
            Some(ChangeType::Modified)
        );
        assert_eq!(
            manifest.get("new.rb").map(|r| r.change_type),
            Some(ChangeType::Untracked)
        );
        assert_eq!(
            manifest.get("other.rb").map(|r| r.change_type),
            Some(ChangeType::Tracked)
        );
    }

    #[test]
    fn test_staged_and_unstaged_union() {
        let temp = scratch(&[]);
        let git = FakeGit::new()
            .ok(HEAD_CHECK, "abc\n")
            .ok(STAGED, ":100644 100644 1111 2222 M\0a.rs\0")
            .ok(
                UNSTAGED,
                ":100644 100644 1111 0000 M\0a.rs\0:100644 100644 4444 0000 M\0b.rs\0",
            );

        let options = ManifestOptions {
            unstaged: true,
            ..ManifestOptions::default()
        };
        let manifest = Manifest::build(&git, temp.path(), &options).expect("build");
        assert_eq!(manifest.paths(), vec!["a.rs", "b.rs"]);
        assert_eq!(manifest.get("a.rs").map(|r| r.to.sha.as_str()), Some("2222"));
    }

    #[test]
    fn test_listing_skips_vanished_paths() {
        let temp = scratch(&["kept.txt"]);
        let git = FakeGit::new().ok(UNTRACKED, "kept.txt\0vanished.txt\0");

        let options = ManifestOptions {
            staged: false,
            untracked: true,
            ..ManifestOptions::default()
        };
        let manifest = Manifest::build(&git, temp.path(), &options).expect("build");
        assert_eq!(manifest.paths(), vec!["kept.txt"]);
    }

    #[test]
    fn test_git_failure_is_manifest_unavailable() {
        let temp = scratch(&[]);
        let git = FakeGit::new()
            .ok(HEAD_CHECK, "abc\n")
            .fail(STAGED, "fatal: bad revision 'HEAD'");

        let result = Manifest::build(&git, temp.path(), &staged_only());
        assert!(matches!(
            result,
            Err(Error::ManifestUnavailable { ref message, .. }) if message.contains("bad revision")
        ));
    }

    #[test]
    fn test_malformed_line_aborts_build() {
        let temp = scratch(&[]);
        let git = FakeGit::new()
            .ok(HEAD_CHECK, "abc\n")
            .ok(STAGED, "this is not raw diff output\0");

        let result = Manifest::build(&git, temp.path(), &staged_only());
        assert!(matches!(result, Err(Error::MalformedEntry { .. })));
    }

    #[test]
    fn test_build_keeps_non_ascii_paths_verbatim() {
        let temp = TempDir::new().expect("create temp dir");
        let git = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(temp.path())
                .status()
                .expect("run git");
            assert!(status.success(), "git {args:?}");
        };
        git(&["init", "--quiet"]);
        git(&["config", "core.quotePath", "true"]);
        std::fs::write(temp.path().join("café.rb"), "puts 1\n").expect("write");
        std::fs::write(temp.path().join("naïve.rb"), "puts 2\n").expect("write");
        git(&["add", "café.rb"]);

        let repo = GitRepo::discover_from(temp.path()).expect("discover");
        let options = ManifestOptions {
            untracked: true,
            ..ManifestOptions::default()
        };
        let manifest = Manifest::build(&repo, repo.root(), &options).expect("build");

        assert_eq!(manifest.paths(), vec!["café.rb", "naïve.rb"]);
        let ruby = Limiter::only(
            crate::core::limiter::Attribute::Name,
            [crate::core::limiter::Selector::glob("*.rb").expect("glob")],
        )
        .expect("limiter");
        assert_eq!(manifest.filter([&ruby]).len(), 2);
    }

    #[test]
    fn test_new_deduplicates_keeping_first() {
        let first = ChangeRecord::parse(":100644 100644 1 2 M\tx.rs").expect("parse");
        let second = ChangeRecord::parse(":100644 000000 1 0 D\tx.rs").expect("parse");
        let manifest = Manifest::new([first.clone(), second]);
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("x.rs"), Some(&first));
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::default();
        assert!(manifest.is_empty());
        assert_eq!(manifest.get("anything"), None);
    }
}
