//! Scenario state and the reproduction driver for the BDD tests.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use reprise::engine::{EngineSettings, ReproductionEngine, ReproductionRequest, ReproductionSource};
use reprise::github::PullRequestGateway;
use reprise::local::{CommandGitRunner, RemoteBase};
use reprise::{OctocrabGateway, PersonalAccessToken, PullRequestLocator, ReproductionResult};
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use wiremock::MockServer;

use super::git_host::{GitHost, REPOSITORY};
use super::github::{FORK_OWNER, SOURCE_OWNER};
use super::runtime::{self, SharedRuntime};

#[derive(ScenarioState, Default)]
pub(crate) struct ReproductionState {
    pub(crate) runtime: Slot<SharedRuntime>,
    pub(crate) server: Slot<MockServer>,
    pub(crate) host: Slot<Rc<GitHost>>,
    pub(crate) number: Slot<u64>,
    pub(crate) base: Slot<git2::Oid>,
    pub(crate) head: Slot<git2::Oid>,
    pub(crate) conflicting: Slot<git2::Oid>,
    pub(crate) result: Slot<ReproductionResult>,
}

impl ReproductionState {
    pub(crate) fn host(&self) -> Rc<GitHost> {
        self.host
            .get()
            .unwrap_or_else(|| panic!("git host not initialised"))
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
            .get()
            .unwrap_or_else(|| panic!("pull request number not set"))
    }

    pub(crate) fn result(&self) -> ReproductionResult {
        self.result
            .get()
            .unwrap_or_else(|| panic!("reproduction has not run"))
    }
}

/// Ensures the runtime and server are initialised in `ReproductionState`.
pub(crate) fn ensure_runtime_and_server(state: &ReproductionState) -> SharedRuntime {
    runtime::ensure_runtime_and_server(&state.runtime, &state.server)
        .unwrap_or_else(|error| panic!("failed to initialise runtime: {error}"))
}

/// Reproduces the scenario's pull request against the mock API and the
/// local git host.
pub(crate) fn run_reproduction(state: &ReproductionState) -> ReproductionResult {
    let runtime = ensure_runtime_and_server(state);
    let server_uri = state
        .server
        .with_ref(MockServer::uri)
        .unwrap_or_else(|| panic!("mock server not initialised"));
    let pr_url = format!("{server_uri}/{SOURCE_OWNER}/{REPOSITORY}/pull/{}", state.number());
    let locator = PullRequestLocator::parse(&pr_url)
        .unwrap_or_else(|error| panic!("invalid pull request URL {pr_url}: {error}"));
    let remote_base = RemoteBase::Local(state.host().base());

    let (_, result) = runtime.block_on(async move {
        let token = PersonalAccessToken::new("ghp_reproduction")
            .unwrap_or_else(|error| panic!("invalid token: {error}"));
        let gateway = Arc::new(
            OctocrabGateway::for_token(&token, locator.repository().api_base())
                .unwrap_or_else(|error| panic!("failed to build gateway: {error}")),
        );
        let settings = EngineSettings {
            fork_org: FORK_OWNER.to_owned(),
            token: Some(token),
            remote_base,
            fork_poll_attempts: 1,
            fork_poll_interval: Duration::ZERO,
        };
        let pulls = Arc::clone(&gateway) as Arc<dyn PullRequestGateway>;
        let engine = Arc::new(ReproductionEngine::new(
            pulls,
            gateway,
            Arc::new(CommandGitRunner::default()),
            settings,
        ));
        let request = ReproductionRequest {
            source: ReproductionSource::PullRequest(locator),
            cache_repo: false,
        };

        engine.start(request).collect_until_finished().await
    });

    result.unwrap_or_else(|| panic!("progress stream ended without a result"))
}
