//! High-level intake facade that assembles a pull request snapshot.

use super::error::IntakeError;
use super::gateway::PullRequestGateway;
use super::locator::PullRequestLocator;
use super::models::PullRequestSnapshot;

/// Aggregates pull request metadata and commits using a gateway.
pub struct PullRequestIntake<'client, Gateway>
where
    Gateway: PullRequestGateway + ?Sized,
{
    client: &'client Gateway,
}

impl<'client, Gateway> PullRequestIntake<'client, Gateway>
where
    Gateway: PullRequestGateway + ?Sized,
{
    /// Create a new intake facade using the provided gateway.
    #[must_use]
    pub const fn new(client: &'client Gateway) -> Self {
        Self { client }
    }

    /// Load metadata and the commit list for the target pull request.
    ///
    /// # Errors
    ///
    /// Propagates any failure from the underlying gateway, including GitHub
    /// authentication errors or network problems.
    pub async fn load(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<PullRequestSnapshot, IntakeError> {
        let mut snapshot = self.client.pull_request(locator).await?;
        snapshot.commits = self.client.pull_request_commits(locator).await?;
        Ok(snapshot)
    }
}
