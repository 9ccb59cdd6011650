//! Named external commands.
//!
//! Rules declare the tools their actions call (`rubocop`, `eslint`, ...) once,
//! with optional explicit paths and aliases. Bodies look them up by name with
//! [`CommandRegistry::find`] and branch on absence.

use crate::core::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Normalizes a command name or alias: lowercase, non-`[a-z_]` runs become `_`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[^a-z_]+").expect("name pattern is valid"));
    re.replace_all(&name.to_lowercase(), "_").into_owned()
}

/// An external command available to action bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    name: String,
    #[serde(skip)]
    key: String,
    path: Option<PathBuf>,
    aliases: Vec<String>,
}

impl Command {
    /// Declares a command found on `PATH` under `name`.
    ///
    /// `name` is kept verbatim for `PATH` lookup; lookups by name go through
    /// its normalized form.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        Self {
            name: name.to_string(),
            key: normalize_name(name),
            path: None,
            aliases: Vec::new(),
        }
    }

    /// Pins the executable path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Adds alternative names.
    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aliases
            .extend(aliases.into_iter().map(|a| normalize_name(a.as_ref())));
        self
    }

    /// Executable name as declared.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized name used for lookups.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Normalized aliases.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Returns true if `name` (normalized) is this command's name or an alias.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        let name = normalize_name(name);
        self.key == name || self.aliases.contains(&name)
    }

    /// Resolves the executable: the pinned path, else `which <name>`.
    pub fn resolve(&self) -> Result<PathBuf> {
        self.resolve_in(std::env::var_os("PATH"))
    }

    fn resolve_in(&self, search_path: Option<OsString>) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let cwd = std::env::current_dir().unwrap_or_default();
        which::which_in(&self.name, search_path, cwd).map_err(|_| Error::CommandNotFound {
            command: self.name.clone(),
        })
    }

    /// The pinned path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Ordered set of declared commands.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a command, replacing an earlier one with the same name.
    pub fn register(&mut self, command: Command) {
        self.commands.retain(|c| c.key != command.key);
        self.commands.push(command);
    }

    /// Looks a command up by name or alias.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Command> {
        let key = normalize_name(name);
        self.commands
            .iter()
            .find(|c| c.key == key)
            .or_else(|| self.commands.iter().find(|c| c.aliases.contains(&key)))
    }

    /// Iterates commands in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("rubocop", "rubocop")]
    #[case("ES-Lint", "es_lint")]
    #[case("scss-lint 2", "scss_lint_")]
    #[case("git_lfs", "git_lfs")]
    fn test_normalize_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_name(input), expected);
    }

    #[test]
    fn test_find_by_name_and_alias() {
        let mut registry = CommandRegistry::new();
        registry.register(Command::new("scss-lint").with_aliases(["scss", "sass-lint"]));
        registry.register(Command::new("rubocop"));

        assert_eq!(registry.find("scss_lint").map(Command::name), Some("scss-lint"));
        assert_eq!(registry.find("Sass-Lint").map(Command::name), Some("scss-lint"));
        assert_eq!(registry.find("scss-lint").map(Command::key), Some("scss_lint"));
        assert_eq!(registry.find("RuboCop").map(Command::name), Some("rubocop"));
        assert!(registry.find("eslint").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = CommandRegistry::new();
        registry.register(Command::new("lint").with_path("/old/lint"));
        registry.register(Command::new("lint").with_path("/new/lint"));

        assert_eq!(registry.iter().count(), 1);
        assert_eq!(
            registry.find("lint").and_then(Command::path),
            Some(Path::new("/new/lint"))
        );
    }

    #[test]
    fn test_resolve_pinned_path() {
        let command = Command::new("tool").with_path("/opt/tool/bin/tool");
        assert_eq!(
            command.resolve().expect("resolve"),
            PathBuf::from("/opt/tool/bin/tool")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_on_path() {
        assert!(Command::new("sh").resolve().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_keeps_digits_and_dashes() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let tool = dir.path().join("fmt-2000");
        std::fs::write(&tool, "#!/bin/sh\n").expect("write");
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
        }

        let command = Command::new("fmt-2000");
        assert_eq!(command.name(), "fmt-2000");
        assert_eq!(command.key(), "fmt_");
        let found = command
            .resolve_in(Some(dir.path().as_os_str().to_owned()))
            .expect("resolve");
        assert_eq!(found, tool);
    }

    #[test]
    fn test_resolve_missing() {
        let result = Command::new("definitely_not_a_real_command").resolve();
        assert!(matches!(result, Err(Error::CommandNotFound { .. })));
    }

    #[test]
    fn test_answers_to() {
        let command = Command::new("eslint").with_aliases(["es"]);
        assert!(command.answers_to("ESLint"));
        assert!(command.answers_to("es"));
        assert!(!command.answers_to("tslint"));
    }
}
