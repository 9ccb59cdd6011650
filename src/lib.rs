//! # githooks
//!
//! A git hook runner driven by declarative rules.
//!
//! Each hook phase (`pre-commit`, `commit-msg`, `pre-push`) owns a list of
//! sections, and each section owns a list of actions. When a hook fires, the
//! set of changed files (the manifest) is computed once from git, narrowed by
//! the limiters on every section and action, and handed to the action bodies
//! that still have files in scope.
//!
//! ## Features
//!
//! - **Change manifest**: staged, unstaged, tracked and untracked files, with
//!   renames, copies and mode changes as git reports them
//! - **Limiters**: scope checks by path, name, change type, mode, sha or
//!   similarity score, with regex, glob, bitmask or custom predicates
//! - **Fault containment**: a failing, erroring or panicking action never
//!   stops the rest of the run
//! - **Rules files**: declare sections and actions in `githooks.toml`
//!
//! ## Example
//!
//! ```rust,no_run
//! use githooks::{Action, Attribute, Executor, Hook, Limiter, NoopObserver, Phase, RunContext, Selector};
//! use regex::Regex;
//!
//! fn main() -> githooks::Result<()> {
//!     let mut hook = Hook::new(Phase::PreCommit);
//!     let ruby = Limiter::only(Attribute::Name, [Selector::glob("*.rb")?])?;
//!
//!     hook.section("Ruby", |section| {
//!         section.action(
//!             Action::each_file("No debugger calls", |record, ctx| {
//!                 let pattern = Regex::new(r"binding\.pry")?;
//!                 let hits = record.grep(ctx.root(), &pattern)?;
//!                 for (line, _) in &hits {
//!                     ctx.error(format!("{}:{line}: debugger call", record.path()));
//!                 }
//!                 Ok(hits.is_empty())
//!             })
//!             .limit(ruby),
//!         );
//!     });
//!
//!     let repo = githooks::GitRepo::discover()?;
//!     let executor = Executor::new()?;
//!     let ctx = RunContext {
//!         root: repo.root(),
//!         executor: &executor,
//!         observer: &NoopObserver,
//!         verbose: false,
//!     };
//!     let report = hook.run(&repo, &ctx)?;
//!     std::process::exit(i32::from(!report.success));
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/githooks/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cli;
pub mod config;
pub mod core;

// Re-export main types for convenience
pub use config::{RepoConfig, Rules};
pub use core::action::{Action, ActionContext, ActionReport, ActionStatus, Interrupt, Outcome};
pub use core::change::{ChangeRecord, ChangeType, FileState};
pub use core::command::Command;
pub use core::error::{Error, Result};
pub use core::executor::Executor;
pub use core::git::{GitCommand, GitRepo};
pub use core::hook::{Hook, HookRegistry, HookReport, Phase, RunContext};
pub use core::limiter::{Attribute, AttributeValue, Limiter, Selector};
pub use core::manifest::{Manifest, ManifestOptions};
pub use core::section::{NoopObserver, RunObserver, Section, SectionReport};
