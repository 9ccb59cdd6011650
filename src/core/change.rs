//! File-change records.
//!
//! A [`ChangeRecord`] is one entry of git's raw diff output
//! (`git diff-index --raw` / `git diff-files --raw`, tab- or NUL-delimited)
//! turned into typed fields, or an equivalent record synthesized from a
//! `git ls-files` path.

use crate::core::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Classification of a file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// `A`
    Added,
    /// `C`
    Copied,
    /// `D`
    Deleted,
    /// `M`
    Modified,
    /// `R`
    Renamed,
    /// `T` (file type changed).
    Retyped,
    /// `X`
    Unknown,
    /// `U`
    Unmerged,
    /// `B` (pairing broken).
    Broken,
    /// `?` - synthesized from the untracked listing.
    Untracked,
    /// `^` - synthesized from the tracked listing.
    Tracked,
    /// `*` - wildcard, only meaningful as a match selector.
    Any,
}

impl ChangeType {
    /// All change types, in table order.
    pub const ALL: [Self; 12] = [
        Self::Added,
        Self::Copied,
        Self::Deleted,
        Self::Modified,
        Self::Renamed,
        Self::Retyped,
        Self::Unknown,
        Self::Unmerged,
        Self::Broken,
        Self::Untracked,
        Self::Tracked,
        Self::Any,
    ];

    /// Returns the single-character status code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Copied => 'C',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::Retyped => 'T',
            Self::Unknown => 'X',
            Self::Unmerged => 'U',
            Self::Broken => 'B',
            Self::Untracked => '?',
            Self::Tracked => '^',
            Self::Any => '*',
        }
    }

    /// Looks up a change type by status code.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Returns the lowercase name used in rules files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Copied => "copied",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Renamed => "renamed",
            Self::Retyped => "retyped",
            Self::Unknown => "unknown",
            Self::Unmerged => "unmerged",
            Self::Broken => "broken",
            Self::Untracked => "untracked",
            Self::Tracked => "tracked",
            Self::Any => "any",
        }
    }

    /// Returns true if this type matches `other`, honoring the `Any` wildcard.
    #[must_use]
    pub fn accepts(self, other: Self) -> bool {
        self == Self::Any || self == other
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    /// Accepts either the name (`modified`) or the status code (`M`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(t) = Self::from_code(c) {
                return Ok(t);
            }
        }

        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| format!("Invalid change type: {s}"))
    }
}

/// One side (before or after) of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileState {
    /// File mode bits (e.g. `0o100644`).
    pub mode: u32,
    /// Blob id; all zeros for working-tree and synthesized entries.
    pub sha: String,
    /// Repository-relative path.
    pub path: Option<String>,
}

impl FileState {
    /// Creates a file state.
    #[must_use]
    pub fn new(mode: u32, sha: impl Into<String>, path: Option<String>) -> Self {
        Self {
            mode,
            sha: sha.into(),
            path,
        }
    }
}

/// A single manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// State before the change.
    pub from: FileState,
    /// State after the change.
    pub to: FileState,
    /// Change classification.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Similarity score for renames and copies, 0 otherwise.
    pub score: u32,
}

const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// Status of a well-formed header; never the `*` wildcard.
fn header_status(header: &str) -> Option<ChangeType> {
    header_regex()
        .captures(header)
        .and_then(|caps| caps.name("status"))
        .and_then(|m| m.as_str().chars().next())
        .and_then(ChangeType::from_code)
        .filter(|t| *t != ChangeType::Any)
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^:
            (?P<old_mode>[0-7]+)\x20
            (?P<new_mode>[0-7]+)\x20
            (?P<old_sha>[0-9a-fA-F]+)\.*\x20
            (?P<new_sha>[0-9a-fA-F]+)\.*\x20
            (?P<status>[A-Z?^*])
            (?P<score>[0-9]+)?
            $",
        )
        .expect("diff header pattern is valid")
    })
}

impl ChangeRecord {
    /// Parses one line of git's raw diff format.
    ///
    /// `:<oldmode> <newmode> <oldsha> <newsha> <status><score?>\t<path>[\t<newpath>]`
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.split('\t');
        let header = fields.next().unwrap_or_default();
        let path = fields.next();
        let new_path = fields.next();

        match (path, fields.next()) {
            (Some(path), None) => Self::from_fields(header, path, new_path, line),
            _ => Err(Error::MalformedEntry {
                line: line.to_string(),
            }),
        }
    }

    /// Parses the NUL-delimited output of `git diff-index -z` / `git diff-files -z`.
    ///
    /// Each entry is a header field followed by one path, or two for renames
    /// and copies. Paths arrive verbatim, without git's octal quoting.
    pub fn parse_nul_stream(output: &str) -> Result<Vec<Self>> {
        let mut fields = output.split('\0').filter(|field| !field.is_empty());
        let mut records = Vec::new();

        while let Some(header) = fields.next() {
            let header = header.trim_start_matches('\n');
            let malformed = || Error::MalformedEntry {
                line: header.to_string(),
            };

            let path = fields.next().ok_or_else(malformed)?;
            let new_path = if header_status(header).is_some_and(|t| {
                matches!(t, ChangeType::Renamed | ChangeType::Copied)
            }) {
                Some(fields.next().ok_or_else(malformed)?)
            } else {
                None
            };

            let line = match new_path {
                Some(new_path) => format!("{header}\t{path}\t{new_path}"),
                None => format!("{header}\t{path}"),
            };
            records.push(Self::from_fields(header, path, new_path, &line)?);
        }

        Ok(records)
    }

    fn from_fields(header: &str, path: &str, new_path: Option<&str>, line: &str) -> Result<Self> {
        let malformed = || Error::MalformedEntry {
            line: line.to_string(),
        };

        if path.is_empty() || new_path.is_some_and(str::is_empty) {
            return Err(malformed());
        }

        let caps = header_regex().captures(header).ok_or_else(malformed)?;

        let mode = |name: &str| -> Result<u32> {
            caps.name(name)
                .and_then(|m| u32::from_str_radix(m.as_str(), 8).ok())
                .ok_or_else(malformed)
        };
        let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        let change_type = header_status(header).ok_or_else(malformed)?;

        let score = match caps.name("score") {
            Some(m) => m.as_str().parse().map_err(|_| malformed())?,
            None => 0,
        };

        let path = path.to_string();
        let new_path = new_path.map_or_else(|| path.clone(), str::to_string);

        Ok(Self {
            from: FileState::new(mode("old_mode")?, text("old_sha").unwrap_or_default(), Some(path)),
            to: FileState::new(mode("new_mode")?, text("new_sha").unwrap_or_default(), Some(new_path)),
            change_type,
            score,
        })
    }

    /// Builds a record for a working-tree path from a `git ls-files` listing.
    ///
    /// The old side is zeroed; the new side carries the file's on-disk mode.
    /// Fails if the path no longer exists.
    pub fn from_working_tree(root: &Path, path: &str, tracked: bool) -> Result<Self> {
        let metadata = std::fs::metadata(root.join(path))
            .map_err(|e| Error::io(format!("stat {path}"), e))?;

        Ok(Self {
            from: FileState::new(0, NULL_SHA, None),
            to: FileState::new(file_mode(&metadata), NULL_SHA, Some(path.to_string())),
            change_type: if tracked {
                ChangeType::Tracked
            } else {
                ChangeType::Untracked
            },
            score: 0,
        })
    }

    /// Repository-relative path: the new side's path, else the old side's.
    #[must_use]
    pub fn path(&self) -> &str {
        self.to
            .path
            .as_deref()
            .or(self.from.path.as_deref())
            .unwrap_or_default()
    }

    /// Final path component.
    #[must_use]
    pub fn name(&self) -> &str {
        let path = self.path();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Absolute path under `root`.
    #[must_use]
    pub fn full_path(&self, root: &Path) -> PathBuf {
        root.join(self.path())
    }

    /// Returns true for deletions, which have no working-tree content.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.change_type == ChangeType::Deleted
    }

    /// Reads the file's current content; `None` for deletions.
    pub fn contents(&self, root: &Path) -> Result<Option<String>> {
        if self.is_deleted() {
            return Ok(None);
        }
        std::fs::read_to_string(self.full_path(root))
            .map(Some)
            .map_err(|e| Error::io(format!("read {}", self.path()), e))
    }

    /// Returns the file's lines without trailing newlines; empty for deletions.
    pub fn lines(&self, root: &Path) -> Result<Vec<String>> {
        Ok(self
            .contents(root)?
            .map(|c| c.lines().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Returns `(line_number, line)` pairs matching `pattern`, numbered from 1.
    pub fn grep(&self, root: &Path, pattern: &Regex) -> Result<Vec<(usize, String)>> {
        Ok(self
            .lines(root)?
            .into_iter()
            .enumerate()
            .filter(|(_, line)| pattern.is_match(line))
            .map(|(i, line)| (i + 1, line))
            .collect())
    }

    /// Re-renders the record as a raw diff line.
    #[must_use]
    pub fn to_raw_line(&self) -> String {
        let score = if self.score > 0
            || matches!(self.change_type, ChangeType::Renamed | ChangeType::Copied)
        {
            format!("{:03}", self.score)
        } else {
            String::new()
        };

        let mut line = format!(
            ":{:06o} {:06o} {} {} {}{}\t",
            self.from.mode,
            self.to.mode,
            self.from.sha,
            self.to.sha,
            self.change_type.code(),
            score
        );

        match (self.from.path.as_deref(), self.to.path.as_deref()) {
            (Some(from), Some(to)) if from != to => {
                line.push_str(from);
                line.push('\t');
                line.push_str(to);
            },
            _ => line.push_str(self.path()),
        }

        line
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o100_444
    } else {
        0o100_644
    }
}
