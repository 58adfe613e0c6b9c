//! Branch construction inside a working clone.
//!
//! Both branches always start at the strategy's base commit. Replay
//! strategies then cherry-pick commits onto the review branch; direct
//! strategies move the review branch straight to the head commit. Nothing is
//! pushed here, so a failure leaves the fork untouched.

use tracing::{debug, info, warn};

use crate::github::CommitRef;
use crate::local::GitCommandError;

use super::error::ReproductionError;
use super::retry::FetchRetryPolicy;
use super::strategy::ReproductionStrategy;

/// Deterministic branch names, which double as the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPair {
    /// Branch the review pull request targets.
    pub base: String,
    /// Branch holding the reproduced change.
    pub review: String,
}

impl BranchPair {
    /// Branches for pull request `number`.
    ///
    /// # Example
    ///
    /// ```
    /// use reprise::engine::cherry_pick::BranchPair;
    ///
    /// let pair = BranchPair::for_pull_request(42);
    /// assert_eq!(pair.base, "base-for-pr-42");
    /// assert_eq!(pair.review, "review-pr-42");
    /// ```
    #[must_use]
    pub fn for_pull_request(number: u64) -> Self {
        Self {
            base: format!("base-for-pr-{number}"),
            review: format!("review-pr-{number}"),
        }
    }

    /// Branches for a commit identified by its abbreviated SHA.
    #[must_use]
    pub fn for_commit(short_sha: &str) -> Self {
        Self {
            base: format!("base-for-{short_sha}"),
            review: format!("review-{short_sha}"),
        }
    }
}

/// Builds the base and review branches for a strategy.
#[derive(Debug, Clone, Copy)]
pub struct CherryPickEngine<'runner> {
    policy: FetchRetryPolicy<'runner>,
}

impl<'runner> CherryPickEngine<'runner> {
    /// Creates an engine operating through `policy`.
    #[must_use]
    pub const fn new(policy: FetchRetryPolicy<'runner>) -> Self {
        Self { policy }
    }

    /// Builds `branches` according to `strategy`, replaying commits when
    /// the strategy calls for it.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::BranchSetup`] when a branch cannot be
    /// created and [`ReproductionError::CherryPickConflict`] when a commit
    /// cannot be replayed.
    pub async fn build(
        &self,
        strategy: &ReproductionStrategy,
        branches: &BranchPair,
    ) -> Result<(), ReproductionError> {
        self.prepare(strategy, branches).await?;
        if let ReproductionStrategy::CherryPickFallback { commits, .. } = strategy {
            self.replay(commits, branches).await?;
        }
        Ok(())
    }

    /// Creates the branches a strategy starts from. The review branch is
    /// left checked out.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::BranchSetup`] when a branch cannot be
    /// created.
    pub async fn prepare(
        &self,
        strategy: &ReproductionStrategy,
        branches: &BranchPair,
    ) -> Result<(), ReproductionError> {
        match strategy {
            ReproductionStrategy::CherryPickFallback { base_sha, .. } => {
                self.create_branch(&branches.base, base_sha).await?;
                self.create_branch(&branches.review, base_sha).await
            }
            ReproductionStrategy::MergeCommitReplay { base_sha, head_sha }
            | ReproductionStrategy::SquashCommitReplay { base_sha, head_sha }
            | ReproductionStrategy::DirectHeadFetch { base_sha, head_sha } => {
                self.create_branch(&branches.base, base_sha).await?;
                self.create_branch(&branches.review, head_sha).await
            }
            ReproductionStrategy::SingleBranch { head_sha } => {
                self.create_branch(&branches.review, head_sha).await
            }
        }
    }

    /// Creates both branches at `base` and replays `commits` onto the review
    /// branch in order.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::BranchSetup`] when a branch cannot be
    /// created and [`ReproductionError::CherryPickConflict`] naming the first
    /// commit that could not be applied after a fetch and retry.
    pub async fn apply(
        &self,
        base: &str,
        commits: &[CommitRef],
        branches: &BranchPair,
    ) -> Result<(), ReproductionError> {
        self.create_branch(&branches.base, base).await?;
        self.create_branch(&branches.review, base).await?;
        self.replay(commits, branches).await
    }

    /// Cherry-picks `commits` onto the checked-out review branch.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::CherryPickConflict`] for the first commit
    /// that fails twice; the in-progress pick is aborted.
    pub async fn replay(
        &self,
        commits: &[CommitRef],
        branches: &BranchPair,
    ) -> Result<(), ReproductionError> {
        let total = commits.len();
        for (index, commit) in commits.iter().enumerate() {
            let position = index + 1;
            debug!(sha = %commit.sha, position, total, "cherry-picking");
            if let Err(error) = self.pick(commit).await {
                return Err(self.conflict(commit, position, total, &error).await);
            }
        }
        info!(branch = %branches.review, total, "commits replayed");
        Ok(())
    }

    async fn pick(&self, commit: &CommitRef) -> Result<(), GitCommandError> {
        let parent_selection: &[&str] = if commit.is_merge() { &["-m", "1"] } else { &[] };
        let command = self.policy.command(
            ["cherry-pick", "--allow-empty", "--keep-redundant-commits"]
                .into_iter()
                .chain(parent_selection.iter().copied())
                .chain([commit.sha.as_str()]),
        );
        let abort = self.policy.command(["cherry-pick", "--abort"]);
        self.policy
            .run(&command, &commit.sha, Some(&abort))
            .await
            .map(drop)
    }

    async fn conflict(
        &self,
        commit: &CommitRef,
        position: usize,
        total: usize,
        error: &GitCommandError,
    ) -> ReproductionError {
        let abort = self.policy.command(["cherry-pick", "--abort"]);
        if let Err(abort_error) = self.policy.run_once(&abort).await {
            // The clone is discarded anyway.
            debug!(error = %abort_error, "cherry-pick abort failed");
        }
        warn!(sha = %commit.sha, position, total, %error, "cherry-pick failed");
        ReproductionError::CherryPickConflict {
            short_sha: commit.short_sha(),
            position,
            total,
            subject: commit.short_message.clone(),
            message: error.stderr().to_owned(),
        }
    }

    /// Points `name` at `sha`, creating the branch or resetting an existing
    /// one in place.
    async fn create_branch(&self, name: &str, sha: &str) -> Result<(), ReproductionError> {
        let branch_setup = |error: GitCommandError| ReproductionError::BranchSetup {
            message: error.to_string(),
        };

        if self.branch_exists(name).await {
            return self.reset_branch(name, sha).await.map_err(branch_setup);
        }

        let create = self.policy.command(["checkout", "-b", name, sha]);
        match self.policy.run(&create, sha, None).await {
            Ok(_) => Ok(()),
            Err(error) if error.stderr().contains("already exists") => {
                debug!(branch = name, "branch appeared concurrently; resetting");
                self.reset_branch(name, sha).await.map_err(branch_setup)
            }
            Err(error) => Err(branch_setup(error)),
        }
    }

    async fn reset_branch(&self, name: &str, sha: &str) -> Result<(), GitCommandError> {
        let checkout = self.policy.command(["checkout", name]);
        self.policy.run_once(&checkout).await?;
        let reset = self.policy.command(["reset", "--hard", sha]);
        self.policy.run(&reset, sha, None).await.map(drop)
    }

    async fn branch_exists(&self, name: &str) -> bool {
        let verify = self.policy.command([
            "rev-parse".to_owned(),
            "--verify".to_owned(),
            "--quiet".to_owned(),
            format!("refs/heads/{name}"),
        ]);
        self.policy
            .run_once(&verify)
            .await
            .is_ok_and(|output| !output.trimmed_stdout().is_empty())
    }
}

#[cfg(test)]
#[path = "cherry_pick_tests.rs"]
mod tests;
