//! Error types for git subprocess execution.

use thiserror::Error;

/// Errors raised while running a git subprocess.
///
/// The `command` field always holds the redacted rendering produced by
/// [`super::GitCommand::display`], never the raw arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitCommandError {
    /// The git binary could not be started or its pipes failed.
    #[error("could not run `{command}`: {message}")]
    Spawn {
        /// Redacted command line.
        command: String,
        /// Error detail from the operating system.
        message: String,
    },

    /// Git exited with a non-zero status.
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        /// Redacted command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed, redacted standard error output.
        stderr: String,
    },

    /// A remote location could not be turned into a clone URL.
    #[error("invalid remote location: {message}")]
    InvalidRemote {
        /// Details about the rejected location.
        message: String,
    },
}

impl GitCommandError {
    /// Standard error text for failed commands, empty otherwise.
    #[must_use]
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            Self::Spawn { .. } | Self::InvalidRemote { .. } => "",
        }
    }
}
