//! Data models for the GitHub resources the reproduction engine reads and
//! writes.
//!
//! Types prefixed with `Api` are internal deserialisation targets that convert
//! into public domain types.

use serde::{Deserialize, Serialize};

use super::locator::short_sha;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// A single commit as reported by the GitHub API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitRef {
    /// Full commit SHA.
    pub sha: String,
    /// First line of the commit message.
    pub short_message: String,
    /// Parent SHAs in order; more than one marks a merge commit.
    pub parent_shas: Vec<String>,
}

impl CommitRef {
    /// Returns true when the commit has more than one parent.
    #[must_use]
    pub const fn is_merge(&self) -> bool {
        self.parent_shas.len() > 1
    }

    /// Abbreviated SHA for diagnostics.
    #[must_use]
    pub fn short_sha(&self) -> String {
        short_sha(&self.sha)
    }

    /// First parent, if any.
    #[must_use]
    pub fn first_parent(&self) -> Option<&str> {
        self.parent_shas.first().map(String::as_str)
    }
}

/// Point-in-time view of the source pull request.
///
/// Built once per reproduction request and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestSnapshot {
    /// Pull request number.
    pub number: u64,
    /// Title of the pull request.
    pub title: String,
    /// Author login if present.
    pub author: Option<String>,
    /// State reported by GitHub (`open` or `closed`).
    pub state: String,
    /// Whether the pull request has been merged.
    pub merged: bool,
    /// SHA of the merge (or squash) commit, when merged.
    pub merge_commit_sha: Option<String>,
    /// SHA of the base branch tip the pull request targets.
    pub base_sha: Option<String>,
    /// Name of the base branch.
    pub base_ref: Option<String>,
    /// SHA of the head branch tip.
    pub head_sha: Option<String>,
    /// HTML URL for display.
    pub html_url: Option<String>,
    /// Commits on the pull request, oldest first.
    pub commits: Vec<CommitRef>,
}

impl PullRequestSnapshot {
    /// Returns true when GitHub reports the pull request as open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

/// Pull request associated with a commit (`GET /commits/{sha}/pulls`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedPullRequest {
    /// Pull request number.
    pub number: u64,
    /// Whether it has been merged.
    pub merged: bool,
    /// Merge commit SHA, when known.
    pub merge_commit_sha: Option<String>,
}

/// Repository details needed to address a fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// `owner/name`.
    pub full_name: String,
    /// Browser URL.
    pub html_url: String,
    /// Default branch name, when reported.
    pub default_branch: Option<String>,
    /// Whether the repository is a fork.
    pub fork: bool,
}

/// Pull request on the fork created or discovered by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkPullRequest {
    /// Pull request number on the fork.
    pub number: u64,
    /// Browser URL.
    pub html_url: String,
    /// Head branch name.
    pub head_ref: String,
}

/// Payload for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    /// Pull request title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Head branch on the same repository.
    pub head: String,
    /// Base branch on the same repository.
    pub base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiUser {
    pub(super) login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiGitRef {
    pub(super) sha: Option<String>,
    #[serde(rename = "ref")]
    pub(super) name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiPullRequest {
    pub(super) number: u64,
    pub(super) title: Option<String>,
    pub(super) state: Option<String>,
    pub(super) html_url: Option<String>,
    pub(super) user: Option<ApiUser>,
    #[serde(default)]
    pub(super) merged: Option<bool>,
    pub(super) merged_at: Option<String>,
    pub(super) merge_commit_sha: Option<String>,
    pub(super) base: Option<ApiGitRef>,
    pub(super) head: Option<ApiGitRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiShaOnly {
    pub(super) sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiCommitDetail {
    pub(super) message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiCommit {
    pub(super) sha: String,
    pub(super) commit: Option<ApiCommitDetail>,
    #[serde(default)]
    pub(super) parents: Vec<ApiShaOnly>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiRepository {
    pub(super) full_name: String,
    pub(super) html_url: String,
    pub(super) default_branch: Option<String>,
    #[serde(default)]
    pub(super) fork: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiBranch {
    pub(super) commit: ApiShaOnly,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ApiForkPullRequest {
    pub(super) number: u64,
    pub(super) html_url: String,
    pub(super) head: ApiGitRef,
}

impl From<ApiPullRequest> for PullRequestSnapshot {
    fn from(value: ApiPullRequest) -> Self {
        let merged = value.merged.unwrap_or(false) || value.merged_at.is_some();
        let (base_sha, base_ref) = value
            .base
            .map_or((None, None), |base| (base.sha, base.name));
        Self {
            number: value.number,
            title: value.title.unwrap_or_default(),
            author: value.user.and_then(|user| user.login),
            state: value.state.unwrap_or_else(|| "open".to_owned()),
            merged,
            merge_commit_sha: value.merge_commit_sha.filter(|_| merged),
            base_sha,
            base_ref,
            head_sha: value.head.and_then(|head| head.sha),
            html_url: value.html_url,
            commits: Vec::new(),
        }
    }
}

impl From<ApiCommit> for CommitRef {
    fn from(value: ApiCommit) -> Self {
        let short_message = value
            .commit
            .and_then(|detail| detail.message)
            .and_then(|message| message.lines().next().map(ToOwned::to_owned))
            .unwrap_or_default();
        Self {
            sha: value.sha,
            short_message,
            parent_shas: value.parents.into_iter().map(|parent| parent.sha).collect(),
        }
    }
}

impl From<ApiPullRequest> for AssociatedPullRequest {
    fn from(value: ApiPullRequest) -> Self {
        let merged = value.merged.unwrap_or(false) || value.merged_at.is_some();
        Self {
            number: value.number,
            merged,
            merge_commit_sha: value.merge_commit_sha,
        }
    }
}

impl From<ApiRepository> for RepositoryInfo {
    fn from(value: ApiRepository) -> Self {
        Self {
            full_name: value.full_name,
            html_url: value.html_url,
            default_branch: value.default_branch,
            fork: value.fork,
        }
    }
}

impl From<ApiForkPullRequest> for ForkPullRequest {
    fn from(value: ApiForkPullRequest) -> Self {
        Self {
            number: value.number,
            html_url: value.html_url,
            head_ref: value.head.name.unwrap_or_default(),
        }
    }
}
