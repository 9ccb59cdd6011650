//! Report rendering and progress display.

use crate::core::action::{ActionReport, ActionStatus};
use crate::core::error::{Error, Result};
use crate::core::hook::HookReport;
use crate::core::section::RunObserver;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::time::Duration;

/// Printed after a failing run.
pub const FAILURE_FOOTER: [&str; 2] = [
    "Commit failed due to errors listed above.",
    "Please fix and attempt your commit again.",
];

/// Formats an elapsed time as seconds with two decimals.
pub fn elapsed(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

fn glyph(action: &ActionReport) -> String {
    match action.status {
        ActionStatus::Finished if action.success => style("✓").green().to_string(),
        ActionStatus::Finished => style("✗").red().to_string(),
        ActionStatus::Skipped => style("-").yellow().to_string(),
        ActionStatus::Waiting | ActionStatus::Running => style("•").dim().to_string(),
    }
}

/// Renders the text report.
pub fn render_text(report: &HookReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text(&mut out, report);
    out
}

fn write_text(out: &mut String, report: &HookReport) -> fmt::Result {
    for section in &report.sections {
        let heading = format!(
            "===== {} :: {} =====",
            report.phase.display_name(),
            section.title
        );
        let heading = if section.success {
            style(heading).bold()
        } else {
            style(heading).red().bold()
        };
        writeln!(out, "{heading} ({})", elapsed(section.elapsed))?;

        for (index, action) in section.actions.iter().enumerate() {
            writeln!(
                out,
                "  {}. [ {} ] {} ({})",
                index + 1,
                glyph(action),
                action.title,
                elapsed(action.elapsed)
            )?;
            for line in &action.errors {
                writeln!(out, "    {}", style(line).red())?;
            }
            for line in &action.warnings {
                writeln!(out, "    {}", style(line).yellow())?;
            }
        }
        writeln!(out)?;
    }

    if !report.success {
        for line in FAILURE_FOOTER {
            writeln!(out, "{}", style(line).red().bold())?;
        }
    }
    Ok(())
}

/// Serializes any report as pretty JSON.
pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Internal {
        message: format!("Failed to serialize report: {e}"),
    })
}

/// Shows a spinner on stderr while each action runs.
#[derive(Default)]
pub struct SpinnerObserver {
    bar: RefCell<Option<ProgressBar>>,
}

impl fmt::Debug for SpinnerObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinnerObserver")
            .field("active", &self.bar.borrow().is_some())
            .finish()
    }
}

impl SpinnerObserver {
    /// Creates an idle spinner.
    pub const fn new() -> Self {
        Self {
            bar: RefCell::new(None),
        }
    }
}

impl RunObserver for SpinnerObserver {
    fn action_started(&self, section: &str, action: &str) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("{section} :: {action}"));
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Some(previous) = self.bar.replace(Some(bar)) {
            previous.finish_and_clear();
        }
    }

    fn action_finished(&self, _section: &str, _report: &ActionReport) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}
