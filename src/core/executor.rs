//! External process execution.
//!
//! Action commands, pre/post-run executables and the script override all run
//! through [`Executor`]. It owns a current-thread tokio runtime and blocks on
//! each child, so callers stay synchronous while getting separate stdout and
//! stderr capture and an optional timeout.

use crate::core::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::runtime::Runtime;
use tokio::time::timeout;

/// Exit code reported for a command killed by the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Whether the command was killed due to timeout.
    pub timed_out: bool,
    /// Duration the command took to run.
    pub duration: Duration,
}

impl CommandOutput {
    /// Returns true if the command succeeded (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Working directory for the command.
    pub cwd: Option<PathBuf>,
    /// Per-call timeout; falls back to the executor's default.
    pub timeout: Option<Duration>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
}

impl ExecuteOptions {
    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, path: impl AsRef<Path>) -> Self {
        self.cwd = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Synchronous front-end over `tokio::process`.
#[derive(Debug)]
pub struct Executor {
    runtime: Runtime,
    default_timeout: Option<Duration>,
}

impl Executor {
    /// Creates an executor with no default timeout.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::io("start process runtime", e))?;

        Ok(Self {
            runtime,
            default_timeout: None,
        })
    }

    /// Sets the timeout applied when a call does not specify one.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the default timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Runs a shell snippet with `sh -c`; `args` become `"$@"`.
    pub fn shell<S: AsRef<OsStr>>(
        &self,
        script: &str,
        args: &[S],
        options: &ExecuteOptions,
    ) -> Result<CommandOutput> {
        let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };

        let mut cmd = Command::new(shell);
        cmd.arg(flag).arg(script);
        if !cfg!(windows) {
            cmd.arg("githooks");
        }
        cmd.args(args);

        self.execute(cmd, script, options)
    }

    /// Runs an executable directly with `args`.
    pub fn program<S: AsRef<OsStr>>(
        &self,
        program: &Path,
        args: &[S],
        options: &ExecuteOptions,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.execute(cmd, &program.display().to_string(), options)
    }

    fn execute(&self, mut cmd: Command, label: &str, options: &ExecuteOptions) -> Result<CommandOutput> {
        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let limit = options.timeout.or(self.default_timeout);
        tracing::debug!(command = label, timeout = ?limit, "executing");

        self.runtime.block_on(run_child(cmd, label, limit))
    }

    /// Checks if a command exists in PATH.
    #[must_use]
    pub fn command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }
}

/// Spawns the command and collects its output, killing it past `limit`.
async fn run_child(mut cmd: Command, label: &str, limit: Option<Duration>) -> Result<CommandOutput> {
    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::io(format!("spawn {label}"), e))?;

    let result = match limit {
        Some(duration) => match timeout(duration, wait_for_output(&mut child)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(command = label, "command timed out");
                drop(child.kill().await);
                return Ok(CommandOutput {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!(
                        "Command timed out after {}",
                        humantime::format_duration(duration)
                    ),
                    timed_out: true,
                    duration: start.elapsed(),
                });
            },
        },
        None => wait_for_output(&mut child).await,
    };

    let (exit_code, stdout, stderr) = result?;
    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        timed_out: false,
        duration: start.elapsed(),
    })
}

/// Waits for the child, draining both pipes concurrently.
async fn wait_for_output(child: &mut tokio::process::Child) -> Result<(i32, String, String)> {
    let read_stdout = drain(child.stdout.take());
    let read_stderr = drain(child.stderr.take());

    let (stdout, stderr, status) = tokio::join!(read_stdout, read_stderr, child.wait());
    let status = status.map_err(|e| Error::io("wait for command", e))?;

    Ok((status.code().unwrap_or(1), stdout?, stderr?))
}

/// Reads a pipe to EOF; invalid UTF-8 is replaced, never truncated.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Result<String> {
    let mut bytes = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut bytes)
            .await
            .map_err(|e| Error::io("read command output", e))?;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
