//! CLI command implementations.

use super::output::{self, SpinnerObserver};
use super::{Format, RunArgs, SourceArgs};
use crate::config::{self, RepoConfig, RepoOption, Rules};
use crate::core::error::{Error, Result};
use crate::core::executor::{ExecuteOptions, Executor};
use crate::core::git::GitRepo;
use crate::core::hook::{Hook, HookRegistry, HookReport, Phase, RunContext};
use crate::core::manifest::Manifest;
use crate::core::section::{NoopObserver, RunObserver};
use console::style;
use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::PoisonError;

/// Set to force a failing exit code.
const FORCE_FAIL_ENV: &str = "GITHOOKS_FORCE_FAIL";

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| Error::io("get current dir", e))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Finds and loads the rules file.
fn load_rules(
    explicit: Option<&Path>,
    repo: Option<&GitRepo>,
    cwd: &Path,
) -> Result<(PathBuf, Rules)> {
    let hooks_path = match repo {
        Some(repo) => RepoConfig::new(repo, repo.root()).hooks_path()?,
        None => None,
    };
    let path = config::locate(explicit, hooks_path.as_deref(), cwd)?;
    let rules = Rules::load_from(&path)?;
    Ok((path, rules))
}

/// Runs each executable with the hook arguments, stopping at the first failure.
fn run_external(
    stage: RepoOption,
    executables: &[PathBuf],
    args: &[String],
    executor: &Executor,
    root: &Path,
) -> Result<()> {
    for executable in executables {
        tracing::info!(stage = %stage, executable = %executable.display(), "running");
        let output = executor.program(executable, args, &ExecuteOptions::default().cwd(root))?;
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
        if !output.success() {
            return Err(Error::ExternalFailed {
                stage: stage.to_string(),
                executable: executable.clone(),
                exit_code: output.exit_code,
            });
        }
    }
    Ok(())
}

/// Run the rules for a phase.
pub fn run(args: &RunArgs, verbose: bool, quiet: bool) -> Result<ExitCode> {
    let phase: Phase = args.phase.parse()?;
    let cwd = current_dir()?;

    let registry = HookRegistry::new();
    let repo = registry.repository(&cwd)?;
    let root = repo.root().to_path_buf();
    let repo_config = RepoConfig::new(&*repo, &root);
    let mut executor = Executor::new()?;

    if !args.ignore_script {
        if let Some(script) = repo_config.script()? {
            tracing::info!(script = %script.display(), "running script override");
            let mut script_args = vec![phase.as_str().to_string()];
            script_args.extend(args.args.iter().cloned());
            let output = executor.program(
                &script,
                script_args.as_slice(),
                &ExecuteOptions::default().cwd(&root),
            )?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            return Ok(exit_code(output.success()));
        }
    }

    if !args.skip_pre {
        let executables = repo_config.pre_run_execute()?;
        run_external(RepoOption::PreRunExecute, &executables, &args.args, &executor, &root)?;
    }

    let (path, rules) = load_rules(args.rules.as_deref(), Some(&*repo), &cwd)?;
    tracing::debug!(rules = %path.display(), %phase, "loaded rules");
    executor = executor.with_timeout(rules.settings.timeout()?);

    let hook = registry.hook(phase);
    let mut hook = hook.lock().unwrap_or_else(PoisonError::into_inner);
    rules.apply(phase, &mut hook)?;
    hook.set_args(args.args.clone()).set_options(args.source.options());

    let spinner = SpinnerObserver::new();
    let observer: &dyn RunObserver =
        if args.format == Format::Text && !quiet && std::io::stderr().is_terminal() {
            &spinner
        } else {
            &NoopObserver
        };

    let ctx = RunContext {
        root: &root,
        executor: &executor,
        observer,
        verbose,
    };
    let report = hook.run(&*repo, &ctx)?;
    print_report(&report, args.format, quiet)?;

    if !args.skip_post {
        let executables = repo_config.post_run_execute()?;
        run_external(RepoOption::PostRunExecute, &executables, &args.args, &executor, &root)?;
    }

    let forced = std::env::var_os(FORCE_FAIL_ENV).is_some_and(|v| !v.is_empty());
    if forced {
        tracing::warn!("{FORCE_FAIL_ENV} is set, failing the run");
    }
    Ok(exit_code(report.success && !forced))
}

fn print_report(report: &HookReport, format: Format, quiet: bool) -> Result<()> {
    match format {
        Format::Json => println!("{}", output::render_json(report)?),
        // Quiet runs only print failures.
        Format::Text if quiet && report.success => {},
        Format::Text => print!("{}", output::render_text(report)),
    }
    Ok(())
}

/// List configured sections and actions.
pub fn list(phase: Option<&str>, rules: Option<&Path>) -> Result<ExitCode> {
    let cwd = current_dir()?;
    let repo = GitRepo::discover_from(&cwd).ok();
    let (path, rules) = load_rules(rules, repo.as_ref(), &cwd)?;

    let phases = match phase {
        Some(name) => vec![name.parse::<Phase>()?],
        None => rules.phases()?,
    };

    eprintln!("Rules: {}", path.display());
    for phase in phases {
        let mut hook = Hook::new(phase);
        rules.apply(phase, &mut hook)?;
        println!("{}", style(phase.as_str()).bold());
        print_hook(&hook);
    }

    Ok(ExitCode::SUCCESS)
}

fn describe(limiters: &[crate::core::limiter::Limiter]) -> String {
    if limiters.is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = limiters.iter().map(ToString::to_string).collect();
        format!("  ({})", parts.join(", "))
    }
}

fn print_hook(hook: &Hook) {
    if hook.sections().is_empty() {
        println!("  {}", style("(no sections)").dim());
        return;
    }
    for section in hook.sections() {
        let abort = if section.aborts_on_error() {
            " [abort on error]"
        } else {
            ""
        };
        println!(
            "  {}{}{}",
            style(section.title()).cyan(),
            abort,
            describe(section.limiters())
        );
        for (index, action) in section.actions().iter().enumerate() {
            println!(
                "    {}. {} [{}]{}",
                index + 1,
                action.title(),
                action.kind(),
                describe(action.limiters())
            );
        }
    }
}

/// Print the manifest.
pub fn manifest(source: &SourceArgs, format: Format) -> Result<ExitCode> {
    let repo = GitRepo::discover_from(&current_dir()?)?;
    let manifest = Manifest::build(&repo, repo.root(), &source.options())?;

    match format {
        Format::Json => println!("{}", output::render_json(&manifest)?),
        Format::Text => {
            let mut stdout = std::io::stdout().lock();
            for record in &manifest {
                writeln!(stdout, "{}", record.to_raw_line())
                    .map_err(|e| Error::io("write output", e))?;
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

/// Validate the rules file.
pub fn validate(rules: Option<&Path>) -> Result<ExitCode> {
    let cwd = current_dir()?;
    let repo = GitRepo::discover_from(&cwd).ok();

    match load_rules(rules, repo.as_ref(), &cwd) {
        Ok((path, rules)) => {
            eprintln!(
                "{} Rules are valid: {} ({} sections)",
                style("✓").green(),
                path.display(),
                rules.sections.len()
            );
            Ok(ExitCode::SUCCESS)
        },
        Err(Error::ConfigNotFound { path }) => {
            eprintln!(
                "{} Rules file not found: {}",
                style("!").yellow(),
                path.display()
            );
            eprintln!("  Create {} or pass --rules", config::RULES_FILE_NAME);
            Ok(ExitCode::FAILURE)
        },
        Err(e) => {
            eprintln!("{} Rules validation failed: {e}", style("✗").red());
            Ok(ExitCode::FAILURE)
        },
    }
}

/// Show the repository's githooks settings.
pub fn config(format: Format) -> Result<ExitCode> {
    let repo = GitRepo::discover_from(&current_dir()?)?;
    let repo_config = RepoConfig::new(&repo, repo.root());

    let mut values = BTreeMap::new();
    for option in RepoOption::ALL {
        values.insert(repo_config.key(option), repo_config.get(option)?);
    }

    match format {
        Format::Json => println!("{}", output::render_json(&values)?),
        Format::Text => {
            for (key, value) in &values {
                match value {
                    Some(value) => println!("{key} = {}", value.values().join(", ")),
                    None => println!("{key} {}", style("(unset)").dim()),
                }
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

/// Generate shell completions.
pub fn completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(
        shell,
        &mut super::Cli::command(),
        "githooks",
        &mut std::io::stdout(),
    );
}
