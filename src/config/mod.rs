//! Rules file handling.
//!
//! A `githooks.toml` declares commands and, per phase, sections of actions
//! with their limiters. [`Rules::apply`] turns the declarations for one phase
//! into registered sections on a [`Hook`]. Everything is validated when the
//! file is loaded so mistakes surface before any action runs.

pub mod repo;

use crate::core::action::{Action, ActionContext, Interrupt, Outcome, OutputOptions};
use crate::core::command::Command;
use crate::core::error::{Error, Result};
use crate::core::hook::{Hook, Phase};
use crate::core::limiter::{Attribute, AttributeValue, Limiter, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use repo::{ConfigValue, RepoConfig, RepoOption};

/// Default rules file name.
pub const RULES_FILE_NAME: &str = "githooks.toml";

/// Parsed rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rules {
    /// Global settings.
    pub settings: Settings,
    /// Declared external commands by name.
    pub commands: BTreeMap<String, CommandSpec>,
    /// Sections, in registration order.
    #[serde(rename = "section")]
    pub sections: Vec<SectionSpec>,
}

/// `[settings]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Timeout for each external command (humantime, e.g. `"30s"`). None by default.
    pub timeout: Option<String>,
}

impl Settings {
    /// Parsed timeout.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|t| {
                humantime::parse_duration(t).map_err(|e| {
                    Error::config_invalid("settings.timeout", format!("Invalid duration '{t}': {e}"))
                })
            })
            .transpose()
    }
}

/// `[commands.<name>]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSpec {
    /// Executable path; looked up on `PATH` when absent.
    pub path: Option<PathBuf>,
    /// Alternative names.
    pub aliases: Vec<String>,
}

/// `[[section]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionSpec {
    /// Phase name (`pre-commit`, `commit-msg`, `pre-push`).
    pub phase: String,
    /// Title; sections with the same normalized title are merged.
    pub title: String,
    /// Stop the section at the first failing action.
    #[serde(default)]
    pub abort_on_error: bool,
    /// Limiters every action inherits.
    #[serde(default)]
    pub limit: LimitTable,
    /// Inverted limiters every action inherits.
    #[serde(default)]
    pub except: LimitTable,
    /// Actions, in order.
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionSpec>,
}

/// What an action is fed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// One invocation per file, with the path appended.
    EachFile,
    /// One invocation with every path appended.
    #[default]
    AllFiles,
    /// One invocation with the hook arguments appended.
    Args,
}

/// `[[section.action]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    /// Title.
    pub title: String,
    /// What the action is fed.
    #[serde(default)]
    pub on: Feed,
    /// Shell snippet; files or hook arguments arrive as `"$@"`.
    pub run: Option<String>,
    /// Declared command to invoke instead of `run`.
    pub command: Option<String>,
    /// Fixed arguments placed before the files.
    #[serde(default)]
    pub args: Vec<String>,
    /// Prefix for every captured output line.
    pub prefix_output: Option<String>,
    /// Drop blank output lines.
    #[serde(default)]
    pub strip_empty_lines: bool,
    /// Limiters.
    #[serde(default)]
    pub limit: LimitTable,
    /// Inverted limiters.
    #[serde(default)]
    pub except: LimitTable,
}

/// Attribute name to selector.
pub type LimitTable = BTreeMap<String, SelectorSpec>;

/// A selector as written in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    /// Integer literal (mode or score).
    Number(u32),
    /// String literal, interpreted per attribute.
    Text(String),
    /// Any of several selectors.
    List(Vec<SelectorSpec>),
    /// `{ regex = "..." }`
    Regex {
        /// Pattern.
        regex: String,
    },
    /// `{ glob = "..." }`
    Glob {
        /// Pattern.
        glob: String,
    },
    /// `{ bitmask = 0o111 }`
    Bitmask {
        /// Bits that must all be set.
        bitmask: u32,
    },
}

/// Largest value a 16-bit file mode can take.
const MAX_MODE: u32 = 0o177_777;

impl SelectorSpec {
    fn selectors(&self, attribute: Attribute, out: &mut Vec<Selector>) -> Result<()> {
        match self {
            Self::Number(n) if attribute == Attribute::Mode && *n > MAX_MODE => {
                return Err(Error::invalid_limiter(
                    attribute.as_str(),
                    format!("{n} is not a file mode; TOML integers are decimal, write 0o{n} or \"{n}\""),
                ));
            },
            Self::Number(n) => out.push(Selector::Equals(AttributeValue::Number(*n))),
            Self::Text(s) => out.push(Selector::Equals(attribute.parse_value(s)?)),
            Self::List(items) => {
                for item in items {
                    item.selectors(attribute, out)?;
                }
            },
            Self::Regex { regex } => out.push(Selector::regex(regex)?),
            Self::Glob { glob } => out.push(Selector::glob(glob)?),
            Self::Bitmask { bitmask } => out.push(Selector::Bitmask(*bitmask)),
        }
        Ok(())
    }
}

/// Builds limiters from a `limit` or `except` table.
pub fn limiters(table: &LimitTable, inverted: bool) -> Result<Vec<Limiter>> {
    table
        .iter()
        .map(|(name, spec)| {
            let attribute: Attribute = name.parse()?;
            let mut selectors = Vec::new();
            spec.selectors(attribute, &mut selectors)?;
            Limiter::new(attribute, selectors, inverted)
        })
        .collect()
}

impl Rules {
    /// Loads and validates rules from a file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::io("read rules", e))?;
        let rules = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), sections = rules.sections.len(), "rules loaded");
        Ok(rules)
    }

    /// Parses and validates rules from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let rules: Self = toml::from_str(content)
            .map_err(|e| Error::config_parse_with_source("Failed to parse TOML", e))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Checks every phase, limiter, command reference and setting.
    pub fn validate(&self) -> Result<()> {
        self.settings.timeout()?;
        for phase in Phase::ALL {
            self.apply(phase, &mut Hook::new(phase))?;
        }
        Ok(())
    }

    /// Phases with at least one section.
    pub fn phases(&self) -> Result<Vec<Phase>> {
        let mut phases = Vec::new();
        for section in &self.sections {
            let phase: Phase = section.phase.parse()?;
            if !phases.contains(&phase) {
                phases.push(phase);
            }
        }
        phases.sort();
        Ok(phases)
    }

    /// Registers the commands and this phase's sections on `hook`.
    pub fn apply(&self, phase: Phase, hook: &mut Hook) -> Result<()> {
        for (name, spec) in &self.commands {
            let mut command = Command::new(name).with_aliases(&spec.aliases);
            if let Some(path) = &spec.path {
                command = command.with_path(path);
            }
            hook.command(command);
        }

        for (index, spec) in self.sections.iter().enumerate() {
            let section_phase: Phase = spec.phase.parse()?;
            if section_phase != phase {
                continue;
            }

            let mut section_limiters = limiters(&spec.limit, false)?;
            section_limiters.extend(limiters(&spec.except, true)?);

            let mut actions = Vec::with_capacity(spec.actions.len());
            for (action_index, action) in spec.actions.iter().enumerate() {
                let field = format!("section[{index}].action[{action_index}]");
                actions.push(build_action(action, hook, &field)?);
            }

            hook.section(&spec.title, |section| {
                section.abort_on_error(section.aborts_on_error() || spec.abort_on_error);
                for limiter in section_limiters {
                    section.limit(limiter);
                }
                for action in actions {
                    section.action(action);
                }
            });
        }

        Ok(())
    }
}

/// Turns one declared action into an [`Action`].
fn build_action(spec: &ActionSpec, hook: &Hook, field: &str) -> Result<Action> {
    let invocation = match (&spec.run, &spec.command) {
        (Some(script), None) => Invocation::Shell(script.clone()),
        (None, Some(name)) => {
            let command = hook.find_command(name).ok_or_else(|| Error::CommandNotFound {
                command: name.clone(),
            })?;
            Invocation::Command(command.name().to_string())
        },
        _ => {
            return Err(Error::config_invalid(
                field,
                "exactly one of `run` or `command` is required",
            ))
        },
    };

    let step = Arc::new(Step {
        invocation,
        args: spec.args.clone(),
        output: OutputOptions {
            prefix: spec.prefix_output.clone(),
            strip_empty_lines: spec.strip_empty_lines,
        },
    });

    let mut action = match spec.on {
        Feed::EachFile => Action::each_file(&spec.title, move |record, ctx| {
            step.invoke(ctx, &[record.path().to_string()])
        }),
        Feed::AllFiles => Action::all_files(&spec.title, move |manifest, ctx| {
            step.invoke(ctx, &manifest.paths())
        }),
        Feed::Args => Action::args(&spec.title, move |args, ctx| step.invoke(ctx, args)),
    };

    for limiter in limiters(&spec.limit, false)?
        .into_iter()
        .chain(limiters(&spec.except, true)?)
    {
        action = action.limit(limiter);
    }

    Ok(action)
}

#[derive(Debug)]
enum Invocation {
    Shell(String),
    Command(String),
}

/// A declared action's process invocation.
#[derive(Debug)]
struct Step {
    invocation: Invocation,
    args: Vec<String>,
    output: OutputOptions,
}

impl Step {
    fn invoke(&self, ctx: &mut ActionContext<'_>, extra: &[String]) -> Outcome {
        let mut args = self.args.clone();
        args.extend_from_slice(extra);

        match &self.invocation {
            Invocation::Shell(script) => ctx.run_shell(script, &args, &self.output),
            Invocation::Command(name) => match ctx.find_command(name) {
                Some(command) => ctx.run_command(command, &args, &self.output),
                None => Err(Interrupt::from(Error::CommandNotFound {
                    command: name.clone(),
                })),
            },
        }
    }
}

/// Finds the rules file.
///
/// Order: an explicit path, then the repository's configured hooks path
/// (a directory holding `githooks.toml` or the file itself), then every
/// directory from `start` upward, then the user config directory.
pub fn locate(explicit: Option<&Path>, hooks_path: Option<&Path>, start: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            })
        };
    }

    if let Some(path) = hooks_path {
        let candidate = if path.is_dir() {
            path.join(RULES_FILE_NAME)
        } else {
            path.to_path_buf()
        };
        if candidate.is_file() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "configured hooks path has no rules file");
    }

    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(RULES_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        current = dir.parent();
    }

    if let Some(candidate) = dirs::config_dir().map(|d| d.join("githooks").join(RULES_FILE_NAME)) {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(Error::ConfigNotFound {
        path: start.join(RULES_FILE_NAME),
    })
}
