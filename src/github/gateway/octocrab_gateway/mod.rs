//! Octocrab implementation of the pull request and repository gateways.

use async_trait::async_trait;
use http::{StatusCode, Uri};
use octocrab::{Octocrab, Page};
use serde::Serialize;
use url::Url;

use crate::github::error::IntakeError;
use crate::github::locator::{PersonalAccessToken, PullRequestLocator, RepositoryLocator};
use crate::github::models::{
    ApiBranch, ApiCommit, ApiForkPullRequest, ApiPullRequest, ApiRepository,
    AssociatedPullRequest, CommitRef, ForkPullRequest, NewPullRequest, PullRequestSnapshot,
    RepositoryInfo,
};
use crate::github::rate_limit::RateLimitInfo;

use super::error_mapping::{
    is_rate_limit_error, map_create_pull_request_error, map_http_error, map_octocrab_error,
};
use super::{PullRequestGateway, RepositoryGateway};

#[derive(Serialize)]
struct ForkRequest<'a> {
    organization: &'a str,
    default_branch_only: bool,
}

#[derive(Serialize)]
struct ActionsPermissions {
    enabled: bool,
}

/// Octocrab-backed gateway serving both the source repository and the fork.
pub struct OctocrabGateway {
    client: Octocrab,
}

impl OctocrabGateway {
    /// Creates a new gateway from an Octocrab client.
    #[must_use]
    pub const fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Builds an authenticated Octocrab client for the given API base.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError::InvalidUrl` when the base URI cannot be parsed or
    /// `IntakeError::Api` when Octocrab fails to construct a client.
    pub fn for_token(token: &PersonalAccessToken, api_base: &Url) -> Result<Self, IntakeError> {
        let base_uri: Uri = api_base
            .as_str()
            .parse::<Uri>()
            .map_err(|error| IntakeError::InvalidUrl(error.to_string()))?;

        let client = Octocrab::builder()
            .personal_token(token.as_ref())
            .base_uri(base_uri)
            .map_err(|error| IntakeError::Api {
                message: format!("build client failed: {error}"),
            })?
            .build()
            .map_err(|error| map_octocrab_error("build client", &error))?;
        Ok(Self::new(client))
    }

    async fn map_error_with_rate_limit(
        &self,
        operation: &str,
        error: &octocrab::Error,
    ) -> IntakeError {
        match error {
            octocrab::Error::GitHub { source, .. } if is_rate_limit_error(source) => {
                let rate_limit = self.fetch_rate_limit_info().await;
                let base_message =
                    format!("{operation} failed: {message}", message = source.message);
                let message = match &rate_limit {
                    Some(info) => format!("{base_message} ({info})"),
                    None => base_message,
                };

                IntakeError::RateLimitExceeded {
                    rate_limit,
                    message,
                }
            }
            _ => map_octocrab_error(operation, error),
        }
    }

    async fn fetch_rate_limit_info(&self) -> Option<RateLimitInfo> {
        let rate = self.client.ratelimit().get().await.ok()?.rate;
        Some(RateLimitInfo::new(rate.reset))
    }
}

fn extract_github_message(body: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return None;
    };
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}

#[async_trait]
impl PullRequestGateway for OctocrabGateway {
    async fn pull_request(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<PullRequestSnapshot, IntakeError> {
        match self
            .client
            .get::<ApiPullRequest, _, _>(locator.pull_request_path(), None::<&()>)
            .await
        {
            Ok(api) => Ok(api.into()),
            Err(error) => Err(self.map_error_with_rate_limit("pull request", &error).await),
        }
    }

    async fn pull_request_commits(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<Vec<CommitRef>, IntakeError> {
        let page = match self
            .client
            .get::<Page<ApiCommit>, _, _>(locator.commits_path(), Some(&[("per_page", "100")]))
            .await
        {
            Ok(page) => page,
            Err(error) => {
                return Err(self
                    .map_error_with_rate_limit("pull request commits", &error)
                    .await);
            }
        };

        self.client
            .all_pages(page)
            .await
            .map(|commits| commits.into_iter().map(ApiCommit::into).collect())
            .map_err(|error| map_octocrab_error("pull request commits", &error))
    }

    async fn commit(
        &self,
        repository: &RepositoryLocator,
        sha: &str,
    ) -> Result<CommitRef, IntakeError> {
        match self
            .client
            .get::<ApiCommit, _, _>(repository.commit_path(sha), None::<&()>)
            .await
        {
            Ok(api) => Ok(api.into()),
            Err(error) => Err(self
                .map_error_with_rate_limit(&format!("commit {sha}"), &error)
                .await),
        }
    }

    async fn pulls_for_commit(
        &self,
        repository: &RepositoryLocator,
        sha: &str,
    ) -> Result<Vec<AssociatedPullRequest>, IntakeError> {
        self.client
            .get::<Vec<ApiPullRequest>, _, _>(repository.commit_pulls_path(sha), None::<&()>)
            .await
            .map(|pulls| pulls.into_iter().map(ApiPullRequest::into).collect())
            .map_err(|error| map_octocrab_error("pull requests for commit", &error))
    }
}

#[async_trait]
impl RepositoryGateway for OctocrabGateway {
    async fn repository(
        &self,
        locator: &RepositoryLocator,
    ) -> Result<RepositoryInfo, IntakeError> {
        self.client
            .get::<ApiRepository, _, _>(locator.repo_path(), None::<&()>)
            .await
            .map(ApiRepository::into)
            .map_err(|error| map_octocrab_error(&format!("repository {locator}"), &error))
    }

    async fn create_fork(
        &self,
        source: &RepositoryLocator,
        organisation: &str,
    ) -> Result<RepositoryInfo, IntakeError> {
        let body = ForkRequest {
            organization: organisation,
            default_branch_only: false,
        };
        self.client
            .post::<_, ApiRepository>(source.forks_path(), Some(&body))
            .await
            .map(ApiRepository::into)
            .map_err(|error| map_octocrab_error("create fork", &error))
    }

    async fn disable_actions(&self, locator: &RepositoryLocator) -> Result<(), IntakeError> {
        let uri: Uri = locator
            .actions_permissions_path()
            .parse::<Uri>()
            .map_err(|error| IntakeError::InvalidUrl(error.to_string()))?;

        let response = self
            .client
            ._put(uri, Some(&ActionsPermissions { enabled: false }))
            .await
            .map_err(|error| map_octocrab_error("disable actions", &error))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = self
            .client
            .body_to_string(response)
            .await
            .unwrap_or_else(|_| String::new());
        Err(map_http_error(
            "disable actions",
            status,
            extract_github_message(&body),
        ))
    }

    async fn branch_head(
        &self,
        locator: &RepositoryLocator,
        branch: &str,
    ) -> Result<Option<String>, IntakeError> {
        match self
            .client
            .get::<ApiBranch, _, _>(locator.branch_path(branch), None::<&()>)
            .await
        {
            Ok(api) => Ok(Some(api.commit.sha)),
            Err(octocrab::Error::GitHub { source, .. })
                if source.status_code == StatusCode::NOT_FOUND =>
            {
                Ok(None)
            }
            Err(error) => Err(map_octocrab_error(&format!("branch {branch}"), &error)),
        }
    }

    async fn find_open_pull_request(
        &self,
        locator: &RepositoryLocator,
        head_branch: &str,
    ) -> Result<Option<ForkPullRequest>, IntakeError> {
        let head = format!("{}:{head_branch}", locator.owner().as_str());
        let query = [("state", "open"), ("head", head.as_str())];
        self.client
            .get::<Vec<ApiForkPullRequest>, _, _>(locator.pulls_path(), Some(&query))
            .await
            .map(|pulls| pulls.into_iter().next().map(ApiForkPullRequest::into))
            .map_err(|error| map_octocrab_error("list open pull requests", &error))
    }

    async fn create_pull_request(
        &self,
        locator: &RepositoryLocator,
        request: &NewPullRequest,
    ) -> Result<ForkPullRequest, IntakeError> {
        self.client
            .post::<_, ApiForkPullRequest>(locator.pulls_path(), Some(request))
            .await
            .map(ApiForkPullRequest::into)
            .map_err(|error| map_create_pull_request_error(&error, &request.head, &request.base))
    }
}

#[cfg(test)]
mod tests;
