//! Gateways for talking to GitHub through Octocrab.
//!
//! Read access to the source repository and write access to the fork are
//! separate traits so the engine can be driven by mocks in tests while
//! [`OctocrabGateway`] handles real HTTP requests for both.

mod error_mapping;
mod octocrab_gateway;

pub use octocrab_gateway::OctocrabGateway;

use async_trait::async_trait;

use crate::github::error::IntakeError;
use crate::github::locator::{PullRequestLocator, RepositoryLocator};
use crate::github::models::{
    AssociatedPullRequest, CommitRef, ForkPullRequest, NewPullRequest, PullRequestSnapshot,
    RepositoryInfo,
};

/// Gateway that reads pull requests and commits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PullRequestGateway: Send + Sync {
    /// Fetch pull request metadata; the returned snapshot has no commits.
    async fn pull_request(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<PullRequestSnapshot, IntakeError>;

    /// Fetch every commit on the pull request, oldest first.
    async fn pull_request_commits(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<Vec<CommitRef>, IntakeError>;

    /// Fetch a single commit with its parents.
    async fn commit(
        &self,
        repository: &RepositoryLocator,
        sha: &str,
    ) -> Result<CommitRef, IntakeError>;

    /// List pull requests associated with a commit.
    async fn pulls_for_commit(
        &self,
        repository: &RepositoryLocator,
        sha: &str,
    ) -> Result<Vec<AssociatedPullRequest>, IntakeError>;
}

/// Gateway for repository-level operations on the fork.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Fetch repository details.
    async fn repository(&self, locator: &RepositoryLocator)
    -> Result<RepositoryInfo, IntakeError>;

    /// Request a fork of `source` into `organisation`.
    ///
    /// GitHub creates forks asynchronously; the returned details may refer to
    /// a repository that is not yet readable.
    async fn create_fork(
        &self,
        source: &RepositoryLocator,
        organisation: &str,
    ) -> Result<RepositoryInfo, IntakeError>;

    /// Disable GitHub Actions on the repository.
    async fn disable_actions(&self, locator: &RepositoryLocator) -> Result<(), IntakeError>;

    /// Resolve the tip of a branch, or `None` when the branch does not exist.
    async fn branch_head(
        &self,
        locator: &RepositoryLocator,
        branch: &str,
    ) -> Result<Option<String>, IntakeError>;

    /// Find an open pull request whose head is `head_branch` on the same
    /// repository.
    async fn find_open_pull_request(
        &self,
        locator: &RepositoryLocator,
        head_branch: &str,
    ) -> Result<Option<ForkPullRequest>, IntakeError>;

    /// Open a pull request on the repository.
    async fn create_pull_request(
        &self,
        locator: &RepositoryLocator,
        request: &NewPullRequest,
    ) -> Result<ForkPullRequest, IntakeError>;
}
