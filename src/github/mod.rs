//! GitHub access for the reproduction engine.
//!
//! This module wraps Octocrab to parse pull request, repository and commit
//! inputs, read the source pull request, and manage forks and review pull
//! requests. Errors are mapped into user-friendly variants so that callers can
//! surface precise failures without exposing Octocrab internals.

pub mod error;
pub mod gateway;
pub mod intake;
pub mod locator;
pub mod models;
pub mod rate_limit;

pub use error::IntakeError;
pub use gateway::{OctocrabGateway, PullRequestGateway, RepositoryGateway};
pub use intake::PullRequestIntake;
pub use locator::{
    CommitSha, PersonalAccessToken, PullRequestLocator, PullRequestNumber, RepositoryLocator,
    RepositoryName, RepositoryOwner,
};
pub use models::{
    AssociatedPullRequest, CommitRef, ForkPullRequest, NewPullRequest, PullRequestSnapshot,
    RepositoryInfo,
};
pub use rate_limit::RateLimitInfo;

#[cfg(test)]
pub use gateway::{MockPullRequestGateway, MockRepositoryGateway};

#[cfg(test)]
mod tests;
