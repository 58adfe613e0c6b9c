//! Strategy ladder deciding how a change is reproduced.
//!
//! Direct strategies recreate the exact tree of the source change and cannot
//! conflict, so they are preferred whenever the API reports enough data:
//!
//! 1. merged with a merge commit: replay it (two parents) or its squash
//!    (one parent);
//! 2. open, or the merge commit could not be inspected: use the live
//!    base and head SHAs;
//! 3. otherwise cherry-pick the non-merge commits onto the first commit's
//!    parent.
//!
//! Commit-mode requests start at step 3 for the pull request that produced
//! the commit, or cherry-pick the single commit when no such pull request
//! exists.

use tracing::{debug, warn};

use crate::github::{
    CommitRef, PullRequestGateway, PullRequestIntake, PullRequestLocator,
    PullRequestNumber, PullRequestSnapshot, RepositoryLocator,
};

use super::error::ReproductionError;

/// How the review branch is built. Chosen once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReproductionStrategy {
    /// Base and review branches at the two parents of a true merge commit.
    MergeCommitReplay {
        /// First parent, the target branch before the merge.
        base_sha: String,
        /// Second parent, the merged head.
        head_sha: String,
    },
    /// Base at the squash commit's parent, review at the squash commit.
    SquashCommitReplay {
        /// Parent of the squash commit.
        base_sha: String,
        /// The squash commit itself.
        head_sha: String,
    },
    /// Base and review branches at the pull request's live SHAs.
    DirectHeadFetch {
        /// Current base SHA.
        base_sha: String,
        /// Current head SHA.
        head_sha: String,
    },
    /// Replay `commits` in order onto `base_sha`.
    CherryPickFallback {
        /// Starting point for both branches.
        base_sha: String,
        /// Commits to replay, oldest first.
        commits: Vec<CommitRef>,
    },
    /// Review branch at a parentless commit, published against the fork's
    /// default branch.
    SingleBranch {
        /// Commit the review branch points at.
        head_sha: String,
    },
}

impl ReproductionStrategy {
    /// Short human-readable name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MergeCommitReplay { .. } => "merge commit replay",
            Self::SquashCommitReplay { .. } => "squash commit replay",
            Self::DirectHeadFetch { .. } => "direct head fetch",
            Self::CherryPickFallback { .. } => "cherry-pick",
            Self::SingleBranch { .. } => "single branch",
        }
    }

    /// Commit both branches start from, when a base branch is created.
    #[must_use]
    pub fn base_sha(&self) -> Option<&str> {
        match self {
            Self::MergeCommitReplay { base_sha, .. }
            | Self::SquashCommitReplay { base_sha, .. }
            | Self::DirectHeadFetch { base_sha, .. }
            | Self::CherryPickFallback { base_sha, .. } => Some(base_sha),
            Self::SingleBranch { .. } => None,
        }
    }

    /// Commit the review branch is set to directly, for non-replay
    /// strategies.
    #[must_use]
    pub fn head_sha(&self) -> Option<&str> {
        match self {
            Self::MergeCommitReplay { head_sha, .. }
            | Self::SquashCommitReplay { head_sha, .. }
            | Self::DirectHeadFetch { head_sha, .. }
            | Self::SingleBranch { head_sha } => Some(head_sha),
            Self::CherryPickFallback { .. } => None,
        }
    }

    /// SHAs the working clone needs before branches can be built, in the
    /// order they are used.
    #[must_use]
    pub fn fetch_targets(&self) -> Vec<&str> {
        self.base_sha()
            .into_iter()
            .chain(self.head_sha())
            .chain(self.replayed_commits().iter().map(|commit| commit.sha.as_str()))
            .collect()
    }

    /// Commits replayed onto the review branch; empty for direct strategies.
    #[must_use]
    pub fn replayed_commits(&self) -> &[CommitRef] {
        match self {
            Self::CherryPickFallback { commits, .. } => commits,
            _ => &[],
        }
    }

    /// Returns true when the pull request targets a dedicated base branch.
    #[must_use]
    pub const fn has_base_branch(&self) -> bool {
        !matches!(self, Self::SingleBranch { .. })
    }
}

/// Resolved reproduction plan with the context needed to describe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReproductionPlan {
    /// Chosen strategy.
    pub strategy: ReproductionStrategy,
    /// Source pull request, when one is involved.
    pub pull_request: Option<PullRequestSnapshot>,
    /// Source commit in commit mode.
    pub commit: Option<CommitRef>,
}

impl ReproductionPlan {
    /// Number of commits the reproduced change represents.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        if let ReproductionStrategy::CherryPickFallback { commits, .. } = &self.strategy {
            return commits.len();
        }
        self.pull_request
            .as_ref()
            .map_or(1, |pull_request| pull_request.commits.len().max(1))
    }

    /// Title of the source change: the pull request title, else the commit
    /// subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.pull_request
            .as_ref()
            .map(|pull_request| pull_request.title.as_str())
            .or_else(|| self.commit.as_ref().map(|commit| commit.short_message.as_str()))
            .unwrap_or_default()
    }
}

/// Applies the strategy ladder using a pull request gateway.
pub struct StrategySelector<'client, Gateway>
where
    Gateway: PullRequestGateway + ?Sized,
{
    client: &'client Gateway,
}

impl<'client, Gateway> StrategySelector<'client, Gateway>
where
    Gateway: PullRequestGateway + ?Sized,
{
    /// Creates a selector backed by `client`.
    #[must_use]
    pub const fn new(client: &'client Gateway) -> Self {
        Self { client }
    }

    /// Loads the pull request and chooses a strategy for it.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::NotFound`] when the pull request does not
    /// exist and [`ReproductionError::StrategyResolution`] when every
    /// strategy is exhausted.
    pub async fn resolve_pull_request(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<ReproductionPlan, ReproductionError> {
        let snapshot = PullRequestIntake::new(self.client)
            .load(locator)
            .await
            .map_err(ReproductionError::from_github)?;
        let strategy = self
            .select_for_pull_request(locator.repository(), &snapshot)
            .await?;
        Ok(ReproductionPlan {
            strategy,
            pull_request: Some(snapshot),
            commit: None,
        })
    }

    /// Runs the ladder for an already loaded snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::StrategyResolution`] when no strategy
    /// applies.
    pub async fn select_for_pull_request(
        &self,
        repository: &RepositoryLocator,
        snapshot: &PullRequestSnapshot,
    ) -> Result<ReproductionStrategy, ReproductionError> {
        let mut inspection_failed = false;

        if snapshot.merged {
            match snapshot.merge_commit_sha.as_deref() {
                Some(merge_sha) => match self.inspect_merge_commit(repository, merge_sha).await {
                    Some(strategy) => return Ok(strategy),
                    None => inspection_failed = true,
                },
                None => inspection_failed = true,
            }
        }

        if (snapshot.is_open() || inspection_failed)
            && let (Some(base_sha), Some(head_sha)) = (&snapshot.base_sha, &snapshot.head_sha)
        {
            debug!(number = snapshot.number, "using live base and head");
            return Ok(ReproductionStrategy::DirectHeadFetch {
                base_sha: base_sha.clone(),
                head_sha: head_sha.clone(),
            });
        }

        self.cherry_pick_fallback(repository, snapshot).await
    }

    /// Chooses a strategy for a single commit.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::NotFound`] when the commit does not exist.
    pub async fn resolve_commit(
        &self,
        repository: &RepositoryLocator,
        sha: &str,
    ) -> Result<ReproductionPlan, ReproductionError> {
        let commit = self
            .client
            .commit(repository, sha)
            .await
            .map_err(ReproductionError::from_github)?;

        if let Some(snapshot) = self.merged_pull_request_for(repository, &commit).await {
            match self.cherry_pick_fallback(repository, &snapshot).await {
                Ok(strategy) => {
                    return Ok(ReproductionPlan {
                        strategy,
                        pull_request: Some(snapshot),
                        commit: Some(commit),
                    });
                }
                Err(error) => {
                    warn!(number = snapshot.number, %error, "falling back to single commit");
                }
            }
        }

        let strategy = match commit.first_parent() {
            Some(parent) => ReproductionStrategy::CherryPickFallback {
                base_sha: parent.to_owned(),
                commits: vec![commit.clone()],
            },
            None => ReproductionStrategy::SingleBranch {
                head_sha: commit.sha.clone(),
            },
        };
        Ok(ReproductionPlan {
            strategy,
            pull_request: None,
            commit: Some(commit),
        })
    }

    async fn inspect_merge_commit(
        &self,
        repository: &RepositoryLocator,
        merge_sha: &str,
    ) -> Option<ReproductionStrategy> {
        let commit = match self.client.commit(repository, merge_sha).await {
            Ok(commit) => commit,
            Err(error) => {
                warn!(merge_sha, %error, "merge commit inspection failed");
                return None;
            }
        };

        match commit.parent_shas.as_slice() {
            [base, head, ..] => Some(ReproductionStrategy::MergeCommitReplay {
                base_sha: base.clone(),
                head_sha: head.clone(),
            }),
            [base] => Some(ReproductionStrategy::SquashCommitReplay {
                base_sha: base.clone(),
                head_sha: commit.sha.clone(),
            }),
            [] => {
                warn!(merge_sha, "merge commit has no parents");
                None
            }
        }
    }

    async fn cherry_pick_fallback(
        &self,
        repository: &RepositoryLocator,
        snapshot: &PullRequestSnapshot,
    ) -> Result<ReproductionStrategy, ReproductionError> {
        let commits: Vec<CommitRef> = snapshot
            .commits
            .iter()
            .filter(|commit| !commit.is_merge())
            .cloned()
            .collect();
        let Some(first) = commits.first() else {
            return Err(ReproductionError::StrategyResolution {
                message: format!("pull request #{} has no commits to replay", snapshot.number),
            });
        };

        let refetched_parent = match self.client.commit(repository, &first.sha).await {
            Ok(commit) => commit.first_parent().map(str::to_owned),
            Err(error) => {
                warn!(sha = %first.sha, %error, "could not re-fetch first commit");
                None
            }
        };
        let base_sha = refetched_parent
            .or_else(|| first.first_parent().map(str::to_owned))
            .or_else(|| snapshot.base_sha.clone())
            .ok_or_else(|| ReproductionError::StrategyResolution {
                message: format!("no base commit for pull request #{}", snapshot.number),
            })?;

        Ok(ReproductionStrategy::CherryPickFallback { base_sha, commits })
    }

    async fn merged_pull_request_for(
        &self,
        repository: &RepositoryLocator,
        commit: &CommitRef,
    ) -> Option<PullRequestSnapshot> {
        let associated = match self.client.pulls_for_commit(repository, &commit.sha).await {
            Ok(associated) => associated,
            Err(error) => {
                warn!(sha = %commit.sha, %error, "associated pull request lookup failed");
                return None;
            }
        };
        let number = associated
            .into_iter()
            .find(|pull| pull.merged && pull.merge_commit_sha.as_deref() == Some(&commit.sha))?
            .number;

        let locator = PullRequestLocator::new(
            repository.clone(),
            PullRequestNumber::new(number).ok()?,
        );
        match PullRequestIntake::new(self.client).load(&locator).await {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(number, %error, "associated pull request could not be loaded");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
