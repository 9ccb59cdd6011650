//! Sections: ordered groups of actions sharing a limiter scope.

use crate::core::action::{Action, ActionEnv, ActionReport, ActionStatus};
use crate::core::limiter::Limiter;
use crate::core::manifest::Manifest;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Normalizes a section title into its registry key.
///
/// Lowercase, with every run of non-word characters collapsed to `_`.
#[must_use]
pub fn section_key(title: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\W+").expect("key pattern is valid"));
    re.replace_all(&title.trim().to_lowercase(), "_").into_owned()
}

/// Title-cases each whitespace-separated word.
fn titleize(title: &str) -> String {
    title
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hook callbacks around each action.
pub trait RunObserver {
    /// Called before an in-scope action runs.
    fn action_started(&self, _section: &str, _action: &str) {}

    /// Called after an action ran.
    fn action_finished(&self, _section: &str, _report: &ActionReport) {}
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// An ordered group of actions.
#[derive(Debug)]
pub struct Section {
    key: String,
    title: String,
    limiters: Vec<Limiter>,
    actions: Vec<Action>,
    abort_on_error: bool,
    success: bool,
    elapsed: Duration,
}

impl Section {
    /// Creates an empty section.
    pub fn new(title: &str) -> Self {
        Self {
            key: section_key(title),
            title: titleize(title),
            limiters: Vec::new(),
            actions: Vec::new(),
            abort_on_error: false,
            success: true,
            elapsed: Duration::ZERO,
        }
    }

    /// Registry key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Adds a limiter applied to every action.
    pub fn limit(&mut self, limiter: Limiter) -> &mut Self {
        self.limiters.push(limiter);
        self
    }

    /// Stops the section at the first failing action.
    pub fn abort_on_error(&mut self, abort: bool) -> &mut Self {
        self.abort_on_error = abort;
        self
    }

    /// Appends an action.
    pub fn action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    /// Section-wide limiters.
    #[must_use]
    pub fn limiters(&self) -> &[Limiter] {
        &self.limiters
    }

    /// All registered actions, in order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Whether the section aborts on the first failure.
    #[must_use]
    pub const fn aborts_on_error(&self) -> bool {
        self.abort_on_error
    }

    /// Accumulated success.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Time spent in the last run.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns true if at least one action would run against `manifest`.
    #[must_use]
    pub fn in_scope(&self, manifest: &Manifest) -> bool {
        self.actions
            .iter()
            .any(|a| a.in_scope(&self.limiters, manifest))
    }

    /// Runs every in-scope action in order.
    ///
    /// Out-of-scope actions are neither run nor reported. With
    /// `abort_on_error`, actions after the first failure stay `Waiting`.
    pub fn run(
        &mut self,
        env: &ActionEnv<'_>,
        manifest: &Manifest,
        observer: &dyn RunObserver,
    ) -> SectionReport {
        let start = Instant::now();
        let mut reports = Vec::new();
        let mut aborted = false;

        for action in &mut self.actions {
            let scoped = action.scope(&self.limiters, manifest);
            if action.is_manifest_driven() && scoped.is_empty() {
                tracing::debug!(action = action.title(), "no files in scope, excluded");
                continue;
            }

            if aborted {
                reports.push(action.report());
                continue;
            }

            observer.action_started(&self.title, action.title());
            let passed = action.run(env, &scoped);
            let report = action.report();
            observer.action_finished(&self.title, &report);
            reports.push(report);

            self.success &= passed;
            if !passed && self.abort_on_error {
                tracing::info!(section = %self.title, "aborting section after failure");
                aborted = true;
            }
        }

        self.elapsed = start.elapsed();
        SectionReport {
            title: self.title.clone(),
            success: self.success,
            elapsed: self.elapsed,
            actions: reports,
        }
    }
}

/// Result of one section, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    /// Title.
    pub title: String,
    /// Logical AND of the actions that ran.
    pub success: bool,
    /// Wall time for the whole section.
    #[serde(serialize_with = "crate::core::action::seconds")]
    pub elapsed: Duration,
    /// In-scope actions, in order.
    pub actions: Vec<ActionReport>,
}

impl SectionReport {
    /// Actions left waiting by an abort.
    pub fn waiting(&self) -> impl Iterator<Item = &ActionReport> {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Waiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change::{ChangeRecord, ChangeType};
    use crate::core::command::CommandRegistry;
    use crate::core::executor::Executor;
    use crate::core::limiter::{Attribute, Selector};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::RefCell;

    fn manifest() -> Manifest {
        Manifest::new([
            ChangeRecord::parse(":100644 100644 aaaa0000 bbbb1111 M\tsrc/app.rb").expect("parse"),
            ChangeRecord::parse(":000000 100644 0000 cccc A\tdocs/guide.md").expect("parse"),
        ])
    }

    fn run(section: &mut Section, observer: &dyn RunObserver) -> SectionReport {
        let executor = Executor::new().expect("executor");
        let commands = CommandRegistry::new();
        let root = std::env::temp_dir();
        let env = ActionEnv {
            root: &root,
            args: &[],
            commands: &commands,
            executor: &executor,
            verbose: false,
        };
        section.run(&env, &manifest(), observer)
    }

    fn pass(title: &str) -> Action {
        Action::all_files(title, |_, _| Ok(true))
    }

    fn fail(title: &str) -> Action {
        Action::all_files(title, |_, _| Ok(false))
    }

    #[rstest]
    #[case("Ruby Lint", "ruby_lint")]
    #[case("  commit-msg: Format!  ", "commit_msg_format_")]
    #[case("whitespace", "whitespace")]
    fn test_section_key(#[case] title: &str, #[case] expected: &str) {
        assert_eq!(section_key(title), expected);
    }

    #[test]
    fn test_title_is_titleized() {
        assert_eq!(Section::new("ruby  lint checks").title(), "Ruby Lint Checks");
    }

    #[test]
    fn test_abort_on_error_leaves_rest_waiting() {
        let mut section = Section::new("Abort");
        section
            .abort_on_error(true)
            .action(pass("A"))
            .action(fail("B"))
            .action(pass("C"));

        let report = run(&mut section, &NoopObserver);

        assert!(!report.success);
        let statuses: Vec<_> = report.actions.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![ActionStatus::Finished, ActionStatus::Finished, ActionStatus::Waiting]
        );
        assert_eq!(report.waiting().count(), 1);
        assert_eq!(section.actions()[2].status(), ActionStatus::Waiting);
    }

    #[test]
    fn test_without_abort_all_actions_run() {
        let mut section = Section::new("Keep going");
        section.action(pass("A")).action(fail("B")).action(pass("C"));

        let report = run(&mut section, &NoopObserver);

        assert!(!report.success);
        assert!(report
            .actions
            .iter()
            .all(|a| a.status == ActionStatus::Finished));
        assert!(report.actions[2].success);
    }

    #[test]
    fn test_out_of_scope_actions_are_excluded() {
        let deleted = Limiter::only(Attribute::Type, [ChangeType::Deleted.into()]).expect("limiter");
        let mut section = Section::new("Scoped");
        section
            .action(pass("Everything"))
            .action(fail("Deleted only").limit(deleted));

        let report = run(&mut section, &NoopObserver);

        assert!(report.success);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].title, "Everything");
        assert_eq!(section.actions()[1].status(), ActionStatus::Waiting);
    }

    #[test]
    fn test_section_limiters_scope_actions() {
        let docs = Limiter::only(Attribute::Path, [Selector::glob("docs/*").expect("glob")])
            .expect("limiter");
        let mut section = Section::new("Docs");
        section
            .limit(docs)
            .action(Action::all_files("Count", |manifest, ctx| {
                ctx.warn(manifest.paths().join(","));
                Ok(true)
            }));

        let report = run(&mut section, &NoopObserver);
        assert_eq!(report.actions[0].warnings, ["docs/guide.md"]);
    }

    #[test]
    fn test_in_scope() {
        let deleted = Limiter::only(Attribute::Type, [ChangeType::Deleted.into()]).expect("limiter");
        let mut section = Section::new("Deleted files");
        section.limit(deleted).action(pass("Check"));

        assert!(!section.in_scope(&manifest()));
        assert!(!Section::new("Empty").in_scope(&manifest()));
    }

    #[test]
    fn test_skipped_action_does_not_fail_section() {
        let mut section = Section::new("Optional");
        section.action(Action::all_files("Maybe", |_, _| {
            Err(crate::core::action::Interrupt::Skip)
        }));

        let report = run(&mut section, &NoopObserver);
        assert!(report.success);
        assert_eq!(report.actions[0].status, ActionStatus::Skipped);
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl RunObserver for Recorder {
        fn action_started(&self, section: &str, action: &str) {
            self.events.borrow_mut().push(format!("start {section}/{action}"));
        }

        fn action_finished(&self, section: &str, report: &ActionReport) {
            self.events
                .borrow_mut()
                .push(format!("end {section}/{} {}", report.title, report.success));
        }
    }

    #[test]
    fn test_observer_sees_each_action() {
        let mut section = Section::new("Observed");
        section.action(pass("A")).action(fail("B"));

        let recorder = Recorder::default();
        run(&mut section, &recorder);

        assert_eq!(
            *recorder.events.borrow(),
            vec![
                "start Observed/A",
                "end Observed/A true",
                "start Observed/B",
                "end Observed/B false",
            ]
        );
    }
}
