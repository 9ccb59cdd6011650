//! Hooks: one per phase, holding the registered sections.
//!
//! A [`Hook`] is where rules register their sections and commands. Running
//! it builds the manifest once, then walks the in-scope sections in
//! registration order. [`HookRegistry`] hands out one hook per phase and one
//! repository per resolved root.

use crate::core::action::ActionEnv;
use crate::core::command::{Command, CommandRegistry};
use crate::core::error::{Error, Result};
use crate::core::executor::Executor;
use crate::core::git::{GitCommand, GitRepo};
use crate::core::manifest::{Manifest, ManifestOptions};
use crate::core::section::{section_key, RunObserver, Section, SectionReport};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Git hook lifecycle point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// `pre-commit`
    PreCommit,
    /// `commit-msg`
    CommitMsg,
    /// `pre-push`
    PrePush,
}

impl Phase {
    /// Every supported phase.
    pub const ALL: [Self; 3] = [Self::PreCommit, Self::CommitMsg, Self::PrePush];

    /// Hook file name (`pre-commit`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::CommitMsg => "commit-msg",
            Self::PrePush => "pre-push",
        }
    }

    /// Name used in report headings (`PreCommit`).
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::PreCommit => "PreCommit",
            Self::CommitMsg => "CommitMsg",
            Self::PrePush => "PrePush",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| Error::InvalidPhase {
                phase: s.to_string(),
            })
    }
}

/// What a run needs besides the hook itself.
pub struct RunContext<'a> {
    /// Repository root; action commands run here.
    pub root: &'a Path,
    /// Process runner.
    pub executor: &'a Executor,
    /// Progress callbacks.
    pub observer: &'a dyn RunObserver,
    /// Show full fault chains.
    pub verbose: bool,
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("root", &self.root)
            .field("executor", &self.executor)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Sections, commands and repository options for one phase.
#[derive(Debug)]
pub struct Hook {
    phase: Phase,
    sections: Vec<Section>,
    commands: CommandRegistry,
    args: Vec<String>,
    options: ManifestOptions,
    manifest: Option<Manifest>,
}

impl Hook {
    /// Creates an empty hook.
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            sections: Vec::new(),
            commands: CommandRegistry::new(),
            args: Vec::new(),
            options: ManifestOptions::default(),
            manifest: None,
        }
    }

    /// The phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Creates a section, or re-opens the one with the same key, and lets
    /// `build` add to it.
    pub fn section(&mut self, title: &str, build: impl FnOnce(&mut Section)) -> &mut Self {
        let key = section_key(title);
        match self.sections.iter_mut().find(|s| s.key() == key) {
            Some(section) => build(section),
            None => {
                let mut section = Section::new(title);
                build(&mut section);
                self.sections.push(section);
            },
        }
        self
    }

    /// Declares an external command.
    pub fn command(&mut self, command: Command) -> &mut Self {
        self.commands.register(command);
        self
    }

    /// Looks up a declared command by name or alias.
    #[must_use]
    pub fn find_command(&self, name: &str) -> Option<&Command> {
        self.commands.find(name)
    }

    /// Declared commands.
    #[must_use]
    pub const fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Registered sections, in order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Sets the arguments git passed to the hook.
    pub fn set_args(&mut self, args: Vec<String>) -> &mut Self {
        self.args = args;
        self
    }

    /// Arguments git passed to the hook.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Selects the manifest sources; drops any manifest already built.
    pub fn set_options(&mut self, options: ManifestOptions) -> &mut Self {
        self.options = options;
        self.manifest = None;
        self
    }

    /// Manifest sources.
    #[must_use]
    pub const fn options(&self) -> &ManifestOptions {
        &self.options
    }

    /// Supplies the manifest instead of querying git.
    pub fn set_manifest(&mut self, manifest: Manifest) -> &mut Self {
        self.manifest = Some(manifest);
        self
    }

    /// Returns the manifest, building it on first use.
    pub fn manifest(&mut self, git: &dyn GitCommand, root: &Path) -> Result<&Manifest> {
        if self.manifest.is_none() {
            self.manifest = Some(Manifest::build(git, root, &self.options)?);
        }
        Ok(self.manifest.get_or_insert_with(Manifest::default))
    }

    /// Runs every section with an in-scope action, in registration order.
    ///
    /// Only a manifest failure is returned as an error; everything raised by
    /// action bodies is folded into the report.
    pub fn run(&mut self, git: &dyn GitCommand, ctx: &RunContext<'_>) -> Result<HookReport> {
        let start = Instant::now();
        self.manifest(git, ctx.root)?;
        let manifest = self.manifest.get_or_insert_with(Manifest::default);

        tracing::info!(phase = %self.phase, files = manifest.len(), "running hook");

        let env = ActionEnv {
            root: ctx.root,
            args: &self.args,
            commands: &self.commands,
            executor: ctx.executor,
            verbose: ctx.verbose,
        };

        let mut success = true;
        let mut sections = Vec::new();
        for section in &mut self.sections {
            if !section.in_scope(manifest) {
                tracing::debug!(section = section.title(), "no actions in scope, skipped");
                continue;
            }
            let report = section.run(&env, manifest, ctx.observer);
            success &= report.success;
            sections.push(report);
        }

        Ok(HookReport {
            phase: self.phase,
            success,
            elapsed: start.elapsed(),
            files: manifest.len(),
            sections,
        })
    }
}

/// Result of one hook run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookReport {
    /// The phase that ran.
    pub phase: Phase,
    /// Logical AND of the sections that ran.
    pub success: bool,
    /// Wall time.
    #[serde(serialize_with = "crate::core::action::seconds")]
    pub elapsed: Duration,
    /// Number of files in the manifest.
    pub files: usize,
    /// Sections that ran, in order.
    pub sections: Vec<SectionReport>,
}

impl HookReport {
    /// A report for a run that never reached the rules.
    #[must_use]
    pub const fn empty(phase: Phase, success: bool) -> Self {
        Self {
            phase,
            success,
            elapsed: Duration::ZERO,
            files: 0,
            sections: Vec::new(),
        }
    }
}

/// Process-scoped registry of hooks by phase and repositories by root.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: Mutex<BTreeMap<Phase, Arc<Mutex<Hook>>>>,
    repositories: Mutex<HashMap<PathBuf, Arc<GitRepo>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hook for `phase`, creating it on first access.
    pub fn hook(&self, phase: Phase) -> Arc<Mutex<Hook>> {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            hooks
                .entry(phase)
                .or_insert_with(|| Arc::new(Mutex::new(Hook::new(phase)))),
        )
    }

    /// Returns the hook for a phase name.
    pub fn hook_named(&self, phase: &str) -> Result<Arc<Mutex<Hook>>> {
        Ok(self.hook(phase.parse()?))
    }

    /// Phases that have a hook.
    pub fn phases(&self) -> Vec<Phase> {
        let hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        hooks.keys().copied().collect()
    }

    /// Returns the repository containing `path`, discovering it once per root.
    pub fn repository(&self, path: &Path) -> Result<Arc<GitRepo>> {
        let key = path
            .canonicalize()
            .map_err(|e| Error::io(format!("resolve {}", path.display()), e))?;

        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(repo) = repositories.get(&key) {
            return Ok(Arc::clone(repo));
        }

        let repo = Arc::new(GitRepo::discover_from(&key)?);
        repositories.insert(key, Arc::clone(&repo));
        Ok(repo)
    }
}
