//! Actions: the smallest unit of declared work.
//!
//! An [`Action`] owns a body closure plus the limiters that scope it. Running
//! it hands the body an [`ActionContext`] whose stdout/stderr captures become
//! the action's warnings and errors. Faults and panics raised by the body are
//! contained here and only ever turn into a failed action.

use crate::core::change::ChangeRecord;
use crate::core::command::{Command, CommandRegistry};
use crate::core::executor::{CommandOutput, ExecuteOptions, Executor};
use crate::core::limiter::Limiter;
use crate::core::manifest::Manifest;
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::error::Error as StdError;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Once;
use std::time::{Duration, Instant};

/// Execution state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Not run (yet).
    Waiting,
    /// Body executing.
    Running,
    /// Body returned or faulted.
    Finished,
    /// Body asked to be skipped.
    Skipped,
}

/// Early exit from an action body.
///
/// Any `std::error::Error` converts into a fault, so `?` works inside bodies.
pub enum Interrupt {
    /// Stop without counting as a failure.
    Skip,
    /// Stop and fail the action.
    Fault(Box<dyn StdError + Send + Sync>),
}

impl Interrupt {
    /// Builds a fault from a plain message.
    pub fn fault(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Fault(message.into())
    }
}

impl<E> From<E> for Interrupt
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Fault(Box::new(error))
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("Skip"),
            Self::Fault(e) => f.debug_tuple("Fault").field(&e.to_string()).finish(),
        }
    }
}

/// What an action body returns: pass/fail, or an interrupt.
pub type Outcome = std::result::Result<bool, Interrupt>;

type FileFn = dyn Fn(&ChangeRecord, &mut ActionContext<'_>) -> Outcome + Send + Sync;
type ManifestFn = dyn Fn(&Manifest, &mut ActionContext<'_>) -> Outcome + Send + Sync;
type ArgsFn = dyn Fn(&[String], &mut ActionContext<'_>) -> Outcome + Send + Sync;

/// The work an action performs and what it is fed.
pub enum Body {
    /// Called once per file; the results are AND-ed.
    EachFile(Box<FileFn>),
    /// Called once with the whole filtered manifest.
    AllFiles(Box<ManifestFn>),
    /// Called once with the hook's arguments; never filtered out.
    Args(Box<ArgsFn>),
}

impl Body {
    const fn kind(&self) -> &'static str {
        match self {
            Self::EachFile(_) => "each_file",
            Self::AllFiles(_) => "all_files",
            Self::Args(_) => "args",
        }
    }

    fn call(&self, manifest: &Manifest, ctx: &mut ActionContext<'_>) -> Outcome {
        match self {
            Self::EachFile(f) => {
                let mut passed = true;
                for record in manifest {
                    passed &= f(record, ctx)?;
                }
                Ok(passed)
            },
            Self::AllFiles(f) => f(manifest, ctx),
            Self::Args(f) => f(ctx.args, ctx),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Body({})", self.kind())
    }
}

/// Captured text written by a body.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    buffer: String,
}

impl Capture {
    /// Appends one line.
    pub fn line(&mut self, line: impl AsRef<str>) {
        self.buffer.push_str(line.as_ref());
        self.buffer.push('\n');
    }

    /// Captured lines, without a trailing empty line.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.buffer.lines().map(str::to_string).collect()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How command output is folded into the captures.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// Text prepended to every captured line.
    pub prefix: Option<String>,
    /// Drop lines that are empty after trimming.
    pub strip_empty_lines: bool,
}

/// Everything an action needs from the surrounding run.
#[derive(Debug, Clone, Copy)]
pub struct ActionEnv<'a> {
    /// Repository root.
    pub root: &'a Path,
    /// Arguments passed to the hook.
    pub args: &'a [String],
    /// Declared external commands.
    pub commands: &'a CommandRegistry,
    /// Process runner.
    pub executor: &'a Executor,
    /// Show full fault chains.
    pub verbose: bool,
}

/// Handle given to a running body.
///
/// `out` collects warnings and `err` collects errors. Both are plain
/// buffers; nothing here touches the process's real stdout or stderr.
#[derive(Debug)]
pub struct ActionContext<'a> {
    root: &'a Path,
    args: &'a [String],
    commands: &'a CommandRegistry,
    executor: &'a Executor,
    out: Capture,
    err: Capture,
}

impl<'a> ActionContext<'a> {
    /// Creates a context with empty captures.
    #[must_use]
    pub fn new(env: &ActionEnv<'a>) -> Self {
        Self {
            root: env.root,
            args: env.args,
            commands: env.commands,
            executor: env.executor,
            out: Capture::default(),
            err: Capture::default(),
        }
    }

    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &'a Path {
        self.root
    }

    /// Arguments passed to the hook.
    #[must_use]
    pub fn args(&self) -> &'a [String] {
        self.args
    }

    /// Warning capture (the body's stdout).
    pub fn out(&mut self) -> &mut Capture {
        &mut self.out
    }

    /// Error capture (the body's stderr).
    pub fn err(&mut self) -> &mut Capture {
        &mut self.err
    }

    /// Records a warning line.
    pub fn warn(&mut self, line: impl AsRef<str>) {
        self.out.line(line);
    }

    /// Records an error line.
    pub fn error(&mut self, line: impl AsRef<str>) {
        self.err.line(line);
    }

    /// Looks up a declared command by name or alias.
    #[must_use]
    pub fn find_command(&self, name: &str) -> Option<&'a Command> {
        self.commands.find(name)
    }

    /// Runs a declared command from the repository root.
    ///
    /// Its stdout lines become warnings and its stderr lines errors. Returns
    /// whether it exited successfully.
    pub fn run_command<S: AsRef<OsStr>>(
        &mut self,
        command: &Command,
        args: &[S],
        options: &OutputOptions,
    ) -> Outcome {
        let path = command.resolve()?;
        let output = self.executor.program(&path, args, &self.execute_options())?;
        Ok(self.absorb(&output, options))
    }

    /// Runs a shell snippet from the repository root; `args` become `"$@"`.
    pub fn run_shell<S: AsRef<OsStr>>(
        &mut self,
        script: &str,
        args: &[S],
        options: &OutputOptions,
    ) -> Outcome {
        let output = self.executor.shell(script, args, &self.execute_options())?;
        Ok(self.absorb(&output, options))
    }

    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::default()
            .cwd(self.root)
            .env("GITHOOKS_ROOT", self.root.display().to_string())
    }

    fn absorb(&mut self, output: &CommandOutput, options: &OutputOptions) -> bool {
        let fold = |text: &str, capture: &mut Capture| {
            for line in text.lines() {
                if options.strip_empty_lines && line.trim().is_empty() {
                    continue;
                }
                match &options.prefix {
                    Some(prefix) => capture.line(format!("{prefix}{line}")),
                    None => capture.line(line),
                }
            }
        };
        fold(&output.stdout, &mut self.out);
        fold(&output.stderr, &mut self.err);
        output.success()
    }
}

/// One named check.
#[derive(Debug)]
pub struct Action {
    title: String,
    limiters: Vec<Limiter>,
    body: Body,
    status: ActionStatus,
    success: bool,
    warnings: Vec<String>,
    errors: Vec<String>,
    elapsed: Duration,
}

impl Action {
    /// Creates an action from a body.
    pub fn new(title: impl Into<String>, body: Body) -> Self {
        Self {
            title: title.into(),
            limiters: Vec::new(),
            body,
            status: ActionStatus::Waiting,
            success: true,
            warnings: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Creates an action called once per file.
    pub fn each_file<F>(title: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ChangeRecord, &mut ActionContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self::new(title, Body::EachFile(Box::new(f)))
    }

    /// Creates an action called with the whole filtered manifest.
    pub fn all_files<F>(title: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Manifest, &mut ActionContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self::new(title, Body::AllFiles(Box::new(f)))
    }

    /// Creates an action called with the hook arguments.
    pub fn args<F>(title: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[String], &mut ActionContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self::new(title, Body::Args(Box::new(f)))
    }

    /// Adds a limiter.
    #[must_use]
    pub fn limit(mut self, limiter: Limiter) -> Self {
        self.limiters.push(limiter);
        self
    }

    /// Title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Own limiters (without the section's).
    #[must_use]
    pub fn limiters(&self) -> &[Limiter] {
        &self.limiters
    }

    /// Body kind: `each_file`, `all_files` or `args`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Current state.
    #[must_use]
    pub const fn status(&self) -> ActionStatus {
        self.status
    }

    /// Accumulated success; false sticks once set.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Whether this action counts as passing for its section.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.status, ActionStatus::Skipped) || self.success
    }

    /// Captured warnings.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Captured errors and fault diagnostics.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Time spent in the last run.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns true unless the body takes hook arguments.
    #[must_use]
    pub const fn is_manifest_driven(&self) -> bool {
        !matches!(self.body, Body::Args(_))
    }

    /// Applies the section's limiters and then this action's own.
    #[must_use]
    pub fn scope(&self, section_limiters: &[Limiter], manifest: &Manifest) -> Manifest {
        manifest.filter(section_limiters.iter().chain(&self.limiters))
    }

    /// Whether the action would run at all against `manifest`.
    #[must_use]
    pub fn in_scope(&self, section_limiters: &[Limiter], manifest: &Manifest) -> bool {
        !self.is_manifest_driven() || !self.scope(section_limiters, manifest).is_empty()
    }

    /// Runs the body against an already scoped manifest.
    ///
    /// Never propagates a fault: errors and panics raised by the body are
    /// recorded as diagnostics and fail the action. Returns [`Action::passed`].
    pub fn run(&mut self, env: &ActionEnv<'_>, scoped: &Manifest) -> bool {
        self.status = ActionStatus::Running;
        let start = Instant::now();
        tracing::debug!(action = %self.title, files = scoped.len(), "action running");

        let mut ctx = ActionContext::new(env);
        let body = &self.body;
        let outcome = contain(|| body.call(scoped, &mut ctx));

        let mut skipped = false;
        let mut diagnostics = Vec::new();
        match outcome {
            Ok(Ok(passed)) => self.success &= passed,
            Ok(Err(Interrupt::Skip)) => skipped = true,
            Ok(Err(Interrupt::Fault(error))) => {
                self.success = false;
                diagnostics = describe_fault(error.as_ref(), env.verbose);
            },
            Err(panic) => {
                self.success = false;
                diagnostics.push(panic);
            },
        }

        self.warnings.extend(ctx.out.lines());
        self.errors.extend(ctx.err.lines());
        self.errors.extend(diagnostics);

        self.elapsed = start.elapsed();
        self.status = if skipped {
            ActionStatus::Skipped
        } else {
            ActionStatus::Finished
        };

        tracing::debug!(
            action = %self.title,
            status = ?self.status,
            success = self.success,
            elapsed = ?self.elapsed,
            "action done"
        );
        self.passed()
    }

    /// Snapshot for reporting.
    #[must_use]
    pub fn report(&self) -> ActionReport {
        ActionReport {
            title: self.title.clone(),
            status: self.status,
            success: self.passed(),
            elapsed: self.elapsed,
            warnings: self.warnings.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Result of one action, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    /// Title.
    pub title: String,
    /// Final state.
    pub status: ActionStatus,
    /// Whether it counts as passing.
    pub success: bool,
    /// Time spent.
    #[serde(serialize_with = "seconds")]
    pub elapsed: Duration,
    /// Captured warnings.
    pub warnings: Vec<String>,
    /// Captured errors and diagnostics.
    pub errors: Vec<String>,
}

/// Serializes a duration as fractional seconds.
pub(crate) fn seconds<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Renders a fault: its message, plus the cause chain in verbose mode.
fn describe_fault(error: &(dyn StdError + 'static), verbose: bool) -> Vec<String> {
    let mut lines = vec![error.to_string()];
    if verbose {
        let mut source = error.source();
        while let Some(cause) = source {
            lines.push(format!("  caused by: {cause}"));
            source = cause.source();
        }
    }
    lines
}

thread_local! {
    /// `Some` while [`contain`] runs on this thread; holds the panic location.
    static CONTAINED: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

/// Installs, once per process, a panic hook that stays quiet for panics
/// raised inside [`contain`] and defers to the previous hook otherwise.
fn install_panic_filter() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let contained = CONTAINED.with(|slot| match slot.try_borrow_mut() {
                Ok(mut slot) => match slot.as_mut() {
                    Some(location) => {
                        *location = info.location().map(ToString::to_string);
                        true
                    },
                    None => false,
                },
                Err(_) => false,
            });
            if !contained {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, turning a panic into a message naming where it happened.
///
/// Panics caught here are not printed over the report.
fn contain<R>(f: impl FnOnce() -> R) -> std::result::Result<R, String> {
    install_panic_filter();
    let outer = CONTAINED.with(|slot| slot.replace(Some(None)));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    let location = CONTAINED.with(|slot| slot.replace(outer)).flatten();

    result.map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        match location {
            Some(at) => format!("panicked: {message} (at {at})"),
            None => format!("panicked: {message}"),
        }
    })
}
