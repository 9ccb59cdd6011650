//! Error types for githooks.
//!
//! Faults that abort a whole run live here. Faults raised inside an action
//! body are contained by the action (see [`crate::core::action::Interrupt`])
//! and never surface as an [`Error`].

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in githooks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// Rules file not found.
    #[error("Rules file not found: {path}")]
    ConfigNotFound {
        /// Path where the rules file was expected.
        path: PathBuf,
    },

    /// Failed to parse the rules file.
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        /// Description of the parse error.
        message: String,
        /// Optional source error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {field} - {message}")]
    ConfigInvalid {
        /// Field name that is invalid.
        field: String,
        /// Description of why it's invalid.
        message: String,
    },

    // =========================================================================
    // Git errors
    // =========================================================================
    /// Not in a Git repository.
    #[error("Unable to find a valid git repo in {}", path.display())]
    NotGitRepo {
        /// Directory the lookup started from.
        path: PathBuf,
    },

    /// Git operation failed.
    #[error("Git operation failed: {operation} - {message}")]
    GitOperation {
        /// Name of the operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// A line of raw diff output did not match the expected grammar.
    #[error("Unable to parse incoming diff entry data: {line}")]
    MalformedEntry {
        /// The offending line.
        line: String,
    },

    /// The change manifest could not be computed.
    #[error("Manifest unavailable: `git {command}` failed - {message}")]
    ManifestUnavailable {
        /// The git subcommand line that failed.
        command: String,
        /// Error message.
        message: String,
    },

    // =========================================================================
    // Registration errors
    // =========================================================================
    /// Unknown hook phase.
    #[error("Hook phase ({phase}) must be one of pre-commit, commit-msg, pre-push")]
    InvalidPhase {
        /// The rejected phase name.
        phase: String,
    },

    /// Limiter attribute is not one of the supported record attributes.
    #[error("Invalid attribute type '{attribute}' - expected: name, path, type, mode, sha, or score")]
    UnsupportedAttribute {
        /// The rejected attribute name.
        attribute: String,
    },

    /// Limiter selector does not fit its attribute.
    #[error("Bad {attribute} limiter: {message}")]
    InvalidLimiter {
        /// Attribute the limiter was declared for.
        attribute: String,
        /// What is wrong with it.
        message: String,
    },

    /// Named command is not registered.
    #[error("Command not found: {command}")]
    CommandNotFound {
        /// The command that wasn't found.
        command: String,
    },

    // =========================================================================
    // External executable errors
    // =========================================================================
    /// A pre-run or post-run executable failed.
    #[error("Failed {stage} executable [{}] with exit code {exit_code} - giving up", executable.display())]
    ExternalFailed {
        /// Stage name (`pre-run-execute`, `post-run-execute`).
        stage: String,
        /// Executable that failed.
        executable: PathBuf,
        /// Exit code it returned.
        exit_code: i32,
    },

    // =========================================================================
    // I/O errors
    // =========================================================================
    /// File I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Description of what failed.
        message: String,
        /// Source error.
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Internal errors
    // =========================================================================
    /// Internal error (should never happen).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration parse error.
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new configuration parse error with source.
    pub fn config_parse_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn config_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new I/O error with context.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new Git operation error.
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GitOperation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid limiter error.
    pub fn invalid_limiter(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLimiter {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is a user-correctable error.
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigInvalid { .. }
                | Self::NotGitRepo { .. }
                | Self::InvalidPhase { .. }
                | Self::UnsupportedAttribute { .. }
                | Self::InvalidLimiter { .. }
                | Self::CommandNotFound { .. }
        )
    }

    /// Returns an exit code appropriate for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::InvalidPhase { .. }
            | Self::UnsupportedAttribute { .. }
            | Self::InvalidLimiter { .. }
            | Self::CommandNotFound { .. } => 78, // EX_CONFIG
            Self::NotGitRepo { .. }
            | Self::GitOperation { .. }
            | Self::MalformedEntry { .. }
            | Self::ManifestUnavailable { .. } => 65, // EX_DATAERR
            _ => 1,
        }
    }
}
