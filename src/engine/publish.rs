//! Pushing review branches and opening (or reusing) the review pull request.
//!
//! Branch names are deterministic per source change, so an open pull request
//! whose head is the review branch is the reproduction from an earlier
//! request. It is returned as reused instead of opening a duplicate, and a
//! duplicate reported by GitHub during creation (two requests racing) is
//! resolved the same way.

use std::sync::Arc;

use tracing::{info, warn};

use crate::github::{
    ForkPullRequest, IntakeError, NewPullRequest, RepositoryGateway, RepositoryLocator,
};
use crate::local::{GitCommand, GitRunner};

use super::cherry_pick::BranchPair;
use super::clone::WorkingClone;
use super::error::ReproductionError;

/// Branch the review pull request is opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishBase {
    /// The base branch created for this reproduction; it is pushed first.
    Branch(String),
    /// An existing default branch on the fork, tried as `primary` and then
    /// once as `alternate` when GitHub rejects the base.
    Default {
        /// First choice, usually `main`.
        primary: String,
        /// Fallback, usually `master`.
        alternate: String,
    },
}

impl PublishBase {
    /// `main`, falling back to `master`.
    #[must_use]
    pub fn default_branch() -> Self {
        Self::Default {
            primary: "main".to_owned(),
            alternate: "master".to_owned(),
        }
    }
}

/// Text and target of the review pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMetadata {
    /// Pull request title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Target branch.
    pub base: PublishBase,
}

/// Result of publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Browser URL of the review pull request.
    pub pr_url: String,
    /// Pull request number on the fork.
    pub number: u64,
    /// True when an existing pull request was returned.
    pub reused: bool,
}

impl PublishOutcome {
    fn from_pull_request(pull_request: ForkPullRequest, reused: bool) -> Self {
        Self {
            pr_url: pull_request.html_url,
            number: pull_request.number,
            reused,
        }
    }
}

/// Pushes branches to the fork and finds or creates the pull request.
#[derive(Clone)]
pub struct PullRequestPublisher {
    runner: Arc<dyn GitRunner>,
    gateway: Arc<dyn RepositoryGateway>,
}

impl std::fmt::Debug for PullRequestPublisher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PullRequestPublisher")
            .finish_non_exhaustive()
    }
}

impl PullRequestPublisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(runner: Arc<dyn GitRunner>, gateway: Arc<dyn RepositoryGateway>) -> Self {
        Self { runner, gateway }
    }

    /// Force-pushes the branches and returns the review pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::PushFailure`] when a push fails and
    /// [`ReproductionError::PublishFailure`] when the pull request can
    /// neither be found nor created.
    pub async fn publish(
        &self,
        clone: &WorkingClone,
        fork: &RepositoryLocator,
        branches: &BranchPair,
        metadata: &PublishMetadata,
    ) -> Result<PublishOutcome, ReproductionError> {
        if let PublishBase::Branch(base) = &metadata.base {
            self.push(clone, base).await?;
        }
        self.push(clone, &branches.review).await?;

        if let Some(existing) = self.find_existing(fork, &branches.review).await? {
            info!(url = %existing.html_url, "reusing open review pull request");
            return Ok(PublishOutcome::from_pull_request(existing, true));
        }

        let candidates: Vec<&str> = match &metadata.base {
            PublishBase::Branch(base) => vec![base.as_str()],
            PublishBase::Default { primary, alternate } => {
                vec![primary.as_str(), alternate.as_str()]
            }
        };
        let mut rejected = Vec::new();
        for base in candidates {
            match self.create(fork, branches, metadata, base).await {
                Err(ReproductionError::GitHub(IntakeError::InvalidBaseBranch { .. })) => {
                    warn!(base, "base branch rejected by GitHub");
                    rejected.push(base);
                }
                outcome => return outcome,
            }
        }
        Err(ReproductionError::PublishFailure {
            message: format!("no usable base branch among: {}", rejected.join(", ")),
        })
    }

    async fn push(&self, clone: &WorkingClone, branch: &str) -> Result<(), ReproductionError> {
        let command = GitCommand::new(["push", "--force", "origin"])
            .arg(format!("refs/heads/{branch}:refs/heads/{branch}"))
            .in_dir(clone.path());
        self.runner
            .run(&command)
            .await
            .map(drop)
            .map_err(|error| ReproductionError::PushFailure {
                branch: branch.to_owned(),
                message: error.to_string(),
            })
    }

    async fn find_existing(
        &self,
        fork: &RepositoryLocator,
        head: &str,
    ) -> Result<Option<ForkPullRequest>, ReproductionError> {
        self.gateway
            .find_open_pull_request(fork, head)
            .await
            .map_err(|error| ReproductionError::PublishFailure {
                message: error.to_string(),
            })
    }

    /// Opens the pull request against `base`. Invalid-base errors surface as
    /// [`ReproductionError::GitHub`] so the caller can try another base.
    async fn create(
        &self,
        fork: &RepositoryLocator,
        branches: &BranchPair,
        metadata: &PublishMetadata,
        base: &str,
    ) -> Result<PublishOutcome, ReproductionError> {
        let request = NewPullRequest {
            title: metadata.title.clone(),
            body: metadata.body.clone(),
            head: branches.review.clone(),
            base: base.to_owned(),
        };

        match self.gateway.create_pull_request(fork, &request).await {
            Ok(created) => {
                info!(url = %created.html_url, base, "review pull request opened");
                Ok(PublishOutcome::from_pull_request(created, false))
            }
            Err(IntakeError::DuplicatePullRequest { head }) => {
                info!(%head, "pull request created concurrently; re-discovering");
                self.find_existing(fork, &branches.review)
                    .await?
                    .map(|existing| PublishOutcome::from_pull_request(existing, true))
                    .ok_or_else(|| ReproductionError::PublishFailure {
                        message: format!("duplicate reported for {head} but none is open"),
                    })
            }
            Err(error @ IntakeError::InvalidBaseBranch { .. }) => {
                Err(ReproductionError::GitHub(error))
            }
            Err(error) => Err(ReproductionError::PublishFailure {
                message: error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
