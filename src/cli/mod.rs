//! Command-line interface for githooks.
//!
//! This module provides the `githooks` CLI with subcommands for:
//! - `run`: Run the rules for a hook phase
//! - `list`: List configured sections and actions
//! - `manifest`: Print the files a run would see
//! - `validate`: Validate the rules file
//! - `config`: Show the repository's githooks settings
//!
//! When the binary is invoked under a phase name (for example through a
//! `.git/hooks/pre-commit` link), it behaves like `githooks run <phase>`.

mod commands;
mod output;

use crate::core::error::Result;
use crate::core::hook::Phase;
use crate::core::manifest::ManifestOptions;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Git hook runner driven by declarative rules.
#[derive(Debug, Parser)]
#[command(
    name = "githooks",
    author,
    version,
    about = "Git hook runner driven by declarative rules",
    long_about = r#"
githooks runs ordered, file-scoped checks when git fires a hook.

Rules live in githooks.toml: each [[section]] belongs to a phase
(pre-commit, commit-msg, pre-push) and holds actions limited to the
files they care about.

Quick start:
  githooks validate           # Check the rules file
  githooks manifest           # Show the files a pre-commit run sees
  githooks run pre-commit     # Run the pre-commit rules by hand
  ln -s $(which githooks) .git/hooks/pre-commit

Environment variables:
  GITHOOKS_DEBUG=1            Debug logging
  GITHOOKS_FORCE_FAIL=1       Fail the run even if every action passed
  RUST_LOG=...                Override the log filter
"#,
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging.
    #[arg(long, global = true, env = "GITHOOKS_DEBUG")]
    pub debug: bool,

    /// Suppress non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use color output.
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,
}

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Always use color.
    Always,
    /// Auto-detect color support.
    #[default]
    Auto,
    /// Never use color.
    Never,
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Human-readable report.
    #[default]
    Text,
    /// JSON report on stdout.
    Json,
}

/// Which changes make up the manifest.
#[derive(Debug, Clone, Default, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct SourceArgs {
    /// Include staged changes (the default when no source is given).
    #[arg(long)]
    pub staged: bool,

    /// Include unstaged changes.
    #[arg(long)]
    pub unstaged: bool,

    /// Include every tracked file.
    #[arg(long)]
    pub tracked: bool,

    /// Include untracked files.
    #[arg(long)]
    pub untracked: bool,

    /// Compare staged changes against this ref instead of HEAD.
    #[arg(long = "ref", value_name = "REF")]
    pub reference: Option<String>,
}

impl SourceArgs {
    /// Manifest options for these flags.
    #[must_use]
    pub fn options(&self) -> ManifestOptions {
        let any = self.staged || self.unstaged || self.tracked || self.untracked;
        let mut options = if any {
            ManifestOptions {
                staged: self.staged,
                unstaged: self.unstaged,
                tracked: self.tracked,
                untracked: self.untracked,
                reference: None,
            }
        } else {
            ManifestOptions::default()
        };
        if let Some(reference) = &self.reference {
            options = options.reference(reference);
        }
        options
    }
}

/// Arguments for `githooks run`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Hook phase (pre-commit, commit-msg, pre-push).
    pub phase: String,

    /// Arguments git passed to the hook.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub source: SourceArgs,

    /// Rules file to use instead of searching for one.
    #[arg(long, value_name = "PATH")]
    pub rules: Option<PathBuf>,

    /// Report format.
    #[arg(long, default_value = "text")]
    pub format: Format,

    /// Do not run the pre-run executables.
    #[arg(long)]
    pub skip_pre: bool,

    /// Do not run the post-run executables.
    #[arg(long)]
    pub skip_post: bool,

    /// Run the rules even if a script override is configured.
    #[arg(long)]
    pub ignore_script: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the rules for a hook phase.
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// List configured sections and actions.
    #[command(visible_alias = "l")]
    List {
        /// Only this phase.
        phase: Option<String>,

        /// Rules file to use instead of searching for one.
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,
    },

    /// Print the files a run would see.
    #[command(visible_alias = "m")]
    Manifest {
        #[command(flatten)]
        #[allow(missing_docs)]
        source: SourceArgs,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: Format,
    },

    /// Validate the rules file.
    #[command(visible_alias = "v")]
    Validate {
        /// Rules file to use instead of searching for one.
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,
    },

    /// Show the repository's githooks settings.
    Config {
        /// Output format.
        #[arg(long, default_value = "text")]
        format: Format,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Runs the CLI.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_from(hook_invocation(std::env::args_os().collect()));

    setup_logging(cli.verbose, cli.debug, cli.quiet);
    setup_color(cli.color);

    match cli.command {
        Commands::Run(args) => commands::run(&args, cli.verbose, cli.quiet),
        Commands::List { phase, rules } => commands::list(phase.as_deref(), rules.as_deref()),
        Commands::Manifest { source, format } => commands::manifest(&source, format),
        Commands::Validate { rules } => commands::validate(rules.as_deref()),
        Commands::Config { format } => commands::config(format),
        Commands::Completions { shell } => {
            commands::completions(shell);
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Rewrites `pre-commit ARGS...` into `githooks run pre-commit -- ARGS...`
/// when the program name is a phase.
fn hook_invocation(argv: Vec<OsString>) -> Vec<OsString> {
    let phase = argv
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse::<Phase>().ok());

    match phase {
        Some(phase) => {
            tracing::debug!(%phase, "invoked as a hook");
            let mut rewritten: Vec<OsString> = vec![
                "githooks".into(),
                "run".into(),
                phase.as_str().into(),
                "--".into(),
            ];
            rewritten.extend(argv.into_iter().skip(1));
            rewritten
        },
        None => argv,
    }
}

/// Sets up logging based on verbosity flags.
fn setup_logging(verbose: bool, debug: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Sets up color output.
fn setup_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        },
        ColorChoice::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        },
        ColorChoice::Auto => {
            // Let console crate auto-detect
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse")
    }

    fn strings(argv: &[OsString]) -> Vec<String> {
        argv.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_cli_parsing_help() {
        let cli = Cli::try_parse_from(["githooks", "--help"]);
        // --help causes early exit, so this will be an error
        assert!(cli.is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["githooks"]).is_err());
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&["githooks", "run", "pre-commit"]);
        let Commands::Run(args) = cli.command else {
            #[allow(clippy::panic)]
            {
                panic!("expected run");
            }
        };
        assert_eq!(args.phase, "pre-commit");
        assert!(args.args.is_empty());
        assert_eq!(args.format, Format::Text);
        assert!(!args.skip_pre && !args.skip_post && !args.ignore_script);
    }

    #[test]
    fn test_parse_run_with_hook_args() {
        let cli = parse(&["githooks", "run", "commit-msg", "--", ".git/COMMIT_EDITMSG"]);
        assert!(matches!(
            cli.command,
            Commands::Run(RunArgs { ref args, .. }) if args == &[".git/COMMIT_EDITMSG"]
        ));
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = parse(&[
            "githooks",
            "run",
            "pre-push",
            "--format",
            "json",
            "--skip-pre",
            "--ignore-script",
            "--rules",
            "hooks/githooks.toml",
            "origin",
            "git@example.com:app.git",
        ]);
        let Commands::Run(args) = cli.command else {
            #[allow(clippy::panic)]
            {
                panic!("expected run");
            }
        };
        assert_eq!(args.format, Format::Json);
        assert!(args.skip_pre);
        assert!(args.ignore_script);
        assert_eq!(args.rules, Some(PathBuf::from("hooks/githooks.toml")));
        assert_eq!(args.args, ["origin", "git@example.com:app.git"]);
    }

    #[test]
    fn test_parse_run_alias() {
        let cli = parse(&["githooks", "r", "pre-commit"]);
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_default_sources_are_staged() {
        let options = SourceArgs::default().options();
        assert_eq!(options, ManifestOptions::default());
        assert!(options.staged);
    }

    #[test]
    fn test_explicit_sources_replace_default() {
        let source = SourceArgs {
            untracked: true,
            reference: Some("main".to_string()),
            ..SourceArgs::default()
        };
        let options = source.options();
        assert!(!options.staged);
        assert!(options.untracked);
        assert_eq!(options.reference.as_deref(), Some("main"));
    }

    #[test]
    fn test_parse_manifest_sources() {
        let cli = parse(&["githooks", "manifest", "--unstaged", "--tracked"]);
        let Commands::Manifest { source, format } = cli.command else {
            #[allow(clippy::panic)]
            {
                panic!("expected manifest");
            }
        };
        assert!(source.unstaged && source.tracked);
        assert_eq!(format, Format::Text);
    }

    #[rstest]
    #[case(&["githooks", "list"])]
    #[case(&["githooks", "list", "pre-commit"])]
    #[case(&["githooks", "validate", "--rules", "x.toml"])]
    #[case(&["githooks", "config", "--format", "json"])]
    #[case(&["githooks", "completions", "bash"])]
    fn test_parse_other_subcommands(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = parse(&["githooks", "--debug", "--color", "never", "list"]);
        assert!(cli.debug);
        assert_eq!(cli.color, ColorChoice::Never);

        let cli = parse(&["githooks", "list", "-q"]);
        assert!(cli.quiet);
        assert_eq!(cli.color, ColorChoice::Auto);
    }

    #[test]
    fn test_hook_invocation_rewrites_phase_name() {
        let argv = vec![
            OsString::from("/repo/.git/hooks/commit-msg"),
            OsString::from(".git/COMMIT_EDITMSG"),
        ];
        assert_eq!(
            strings(&hook_invocation(argv)),
            ["githooks", "run", "commit-msg", "--", ".git/COMMIT_EDITMSG"]
        );
    }

    #[test]
    fn test_hook_invocation_parses_as_run() {
        let argv = hook_invocation(vec![OsString::from("pre-push"), OsString::from("origin")]);
        let cli = Cli::try_parse_from(argv).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Run(RunArgs { ref phase, ref args, .. })
                if phase == "pre-push" && args == &["origin"]
        ));
    }

    #[test]
    fn test_regular_invocation_untouched() {
        let argv = vec![OsString::from("/usr/bin/githooks"), OsString::from("list")];
        assert_eq!(strings(&hook_invocation(argv)), ["/usr/bin/githooks", "list"]);
    }
}
