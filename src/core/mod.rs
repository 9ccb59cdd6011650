//! Core engine.
//!
//! - [`change`]: one changed file, parsed from a raw diff line
//! - [`manifest`]: the set of changed files for a run
//! - [`limiter`]: attribute matching used to scope sections and actions
//! - [`action`], [`section`], [`hook`]: the execution state machine
//! - [`command`]: named external commands available to actions
//! - [`executor`]: process runner for external tools
//! - [`git`]: repository discovery and git invocations
//! - [`error`]: error types and result handling

pub mod action;
pub mod change;
pub mod command;
pub mod error;
pub mod executor;
pub mod git;
pub mod hook;
pub mod limiter;
pub mod manifest;
pub mod section;
