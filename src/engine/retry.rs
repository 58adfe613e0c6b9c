//! Fetch-then-retry-once policy for git steps that need upstream objects.
//!
//! Working clones start from the fork, which may not contain every commit
//! of the source repository. When a step that names a commit fails, the
//! policy optionally runs a recovery command (such as `cherry-pick --abort`),
//! fetches the commit from `upstream`, and tries exactly once more.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::local::{GitCommand, GitCommandError, GitOutput, GitRunner};

/// Remote name under which the source repository is registered.
pub const UPSTREAM_REMOTE: &str = "upstream";

/// Retry policy bound to one working clone.
#[derive(Clone, Copy)]
pub struct FetchRetryPolicy<'runner> {
    runner: &'runner dyn GitRunner,
    workdir: &'runner Utf8Path,
}

impl std::fmt::Debug for FetchRetryPolicy<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FetchRetryPolicy")
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl<'runner> FetchRetryPolicy<'runner> {
    /// Creates a policy for the clone at `workdir`.
    #[must_use]
    pub const fn new(runner: &'runner dyn GitRunner, workdir: &'runner Utf8Path) -> Self {
        Self { runner, workdir }
    }

    /// Working clone the policy operates in.
    #[must_use]
    pub const fn workdir(&self) -> &Utf8Path {
        self.workdir
    }

    /// Builds a command that runs inside the working clone.
    #[must_use]
    pub fn command<I, S>(&self, args: I) -> GitCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GitCommand::new(args).in_dir(Utf8PathBuf::from(self.workdir))
    }

    /// Runs a command once, without retry.
    ///
    /// # Errors
    ///
    /// Returns the git failure unchanged.
    pub async fn run_once(&self, command: &GitCommand) -> Result<GitOutput, GitCommandError> {
        self.runner.run(command).await
    }

    /// Fetches a single commit from upstream.
    ///
    /// # Errors
    ///
    /// Returns the git failure when the commit cannot be fetched.
    pub async fn fetch(&self, sha: &str) -> Result<(), GitCommandError> {
        let command = self.command(["fetch", "--no-tags", UPSTREAM_REMOTE, sha]);
        self.runner.run(&command).await.map(drop)
    }

    /// Runs `command`; on failure runs `recover`, fetches `sha` and retries
    /// once.
    ///
    /// # Errors
    ///
    /// Returns the error of the retry when both attempts fail. A failed fetch
    /// does not stop the retry; its error is only logged.
    pub async fn run(
        &self,
        command: &GitCommand,
        sha: &str,
        recover: Option<&GitCommand>,
    ) -> Result<GitOutput, GitCommandError> {
        let first_error = match self.runner.run(command).await {
            Ok(output) => return Ok(output),
            Err(error) => error,
        };
        debug!(command = %command.display(), error = %first_error, "retrying after fetch");

        if let Some(recovery) = recover
            && let Err(error) = self.runner.run(recovery).await
        {
            warn!(command = %recovery.display(), %error, "recovery step failed");
        }
        if let Err(error) = self.fetch(sha).await {
            warn!(sha, %error, "fetch from upstream failed");
        }

        self.runner.run(command).await
    }
}
