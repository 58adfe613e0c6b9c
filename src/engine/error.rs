//! Error taxonomy for reproduction requests.

use thiserror::Error;

use crate::github::IntakeError;
use crate::local::GitCommandError;

/// Fatal outcomes of a reproduction request.
///
/// A duplicate pull request is deliberately absent: the publisher resolves it
/// by re-discovering the existing pull request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReproductionError {
    /// Required configuration such as credentials is missing.
    #[error("configuration error: {message}")]
    Config {
        /// What is missing or invalid.
        message: String,
    },

    /// The source repository, pull request, commit or branch does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// Every strategy in the ladder was exhausted.
    #[error("could not determine how to reproduce the change: {message}")]
    StrategyResolution {
        /// Why the last strategy was rejected.
        message: String,
    },

    /// Cloning the fork failed; partial state has been removed.
    #[error("clone failed: {message}")]
    CloneFailure {
        /// Underlying git error text.
        message: String,
    },

    /// Creating a branch at the resolved base failed.
    #[error("branch setup failed: {message}")]
    BranchSetup {
        /// Underlying git error text.
        message: String,
    },

    /// A commit could not be cherry-picked even after fetching it.
    #[error("cherry-pick of {short_sha} ({position}/{total}) \"{subject}\" failed: {message}")]
    CherryPickConflict {
        /// Abbreviated SHA of the offending commit.
        short_sha: String,
        /// 1-based position of the commit in the replay order.
        position: usize,
        /// Number of commits being replayed.
        total: usize,
        /// Subject line of the offending commit.
        subject: String,
        /// Git error text from the final attempt.
        message: String,
    },

    /// Pushing a branch to the fork failed.
    #[error("push of {branch} failed: {message}")]
    PushFailure {
        /// Branch being pushed.
        branch: String,
        /// Underlying transport error text.
        message: String,
    },

    /// Creating or discovering the review pull request failed.
    #[error("publishing the pull request failed: {message}")]
    PublishFailure {
        /// Underlying API error text.
        message: String,
    },

    /// The caller stopped listening for progress.
    #[error("reproduction cancelled by the caller")]
    Cancelled,

    /// Unexpected GitHub failure.
    #[error(transparent)]
    GitHub(#[from] IntakeError),

    /// Unexpected internal failure, including panics in the pipeline task.
    #[error("internal error: {message}")]
    Internal {
        /// Error detail.
        message: String,
    },
}

impl ReproductionError {
    /// Maps GitHub errors so missing resources become [`Self::NotFound`].
    #[must_use]
    pub fn from_github(error: IntakeError) -> Self {
        match error {
            IntakeError::NotFound { resource } => Self::NotFound { resource },
            IntakeError::MissingToken => Self::Config {
                message: IntakeError::MissingToken.to_string(),
            },
            other => Self::GitHub(other),
        }
    }

    pub(crate) fn clone_failure(error: &GitCommandError) -> Self {
        Self::CloneFailure {
            message: error.to_string(),
        }
    }
}
