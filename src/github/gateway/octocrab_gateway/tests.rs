//! Tests for the Octocrab gateway.

use rstest::{fixture, rstest};
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::OctocrabGateway;
use crate::github::error::IntakeError;
use crate::github::gateway::{PullRequestGateway, RepositoryGateway};
use crate::github::locator::{
    PersonalAccessToken, PullRequestLocator, PullRequestNumber, RepositoryLocator,
};
use crate::github::models::NewPullRequest;
use crate::github::rate_limit::RateLimitInfo;

struct GatewayFixture {
    runtime: Runtime,
    server: MockServer,
    source: RepositoryLocator,
    fork: RepositoryLocator,
    gateway: OctocrabGateway,
}

impl GatewayFixture {
    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn pull_request(&self, number: u64) -> PullRequestLocator {
        let number = PullRequestNumber::new(number).expect("number should be positive");
        PullRequestLocator::new(self.source.clone(), number)
    }

    fn mount(&self, mock: Mock) {
        self.block_on(mock.mount(&self.server));
    }
}

#[fixture]
fn gateway_fixture() -> GatewayFixture {
    let runtime = Runtime::new().expect("runtime should start");
    let server = runtime.block_on(MockServer::start());
    let source = RepositoryLocator::parse(&format!("{}/acme/widgets", server.uri()))
        .expect("should create repository locator");
    let fork = source
        .with_owner("acme-review")
        .expect("should address fork");
    let token = PersonalAccessToken::new("valid-token").expect("token should be valid");
    let gateway = {
        let _guard = runtime.enter();
        OctocrabGateway::for_token(&token, source.api_base()).expect("should create gateway")
    };
    GatewayFixture {
        runtime,
        server,
        source,
        fork,
        gateway,
    }
}

#[rstest]
fn pull_request_maps_merged_metadata(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/widgets/pulls/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "number": 42,
                "title": "Add widgets",
                "state": "closed",
                "merged": true,
                "merge_commit_sha": "m0",
                "html_url": "https://github.com/acme/widgets/pull/42",
                "user": { "login": "octocat" },
                "base": { "sha": "b0", "ref": "main" },
                "head": { "sha": "h0", "ref": "feature" }
            }))),
    );

    let locator = gateway_fixture.pull_request(42);
    let snapshot = gateway_fixture
        .block_on(gateway_fixture.gateway.pull_request(&locator))
        .expect("pull request should load");

    assert_eq!(snapshot.number, 42);
    assert!(snapshot.merged);
    assert_eq!(snapshot.merge_commit_sha.as_deref(), Some("m0"));
    assert!(snapshot.commits.is_empty());
}

#[rstest]
fn missing_pull_request_maps_to_not_found(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/widgets/pulls/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Not Found",
                "documentation_url": "https://docs.github.com/rest"
            }))),
    );

    let locator = gateway_fixture.pull_request(404);
    let result = gateway_fixture.block_on(gateway_fixture.gateway.pull_request(&locator));

    assert!(
        matches!(result, Err(IntakeError::NotFound { .. })),
        "expected NotFound, got {result:?}"
    );
}

#[rstest]
fn exhausted_quota_reports_the_reset_time(gateway_fixture: GatewayFixture) {
    const RESET_AT: u64 = 1_700_000_000;
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/widgets/pulls/42"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "API rate limit exceeded for user",
                "documentation_url": "https://docs.github.com/rest/rate-limit"
            }))),
    );
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": {
                    "core": { "limit": 5000, "used": 5000, "remaining": 0, "reset": RESET_AT },
                    "search": { "limit": 30, "used": 0, "remaining": 30, "reset": RESET_AT }
                },
                "rate": { "limit": 5000, "used": 5000, "remaining": 0, "reset": RESET_AT }
            }))),
    );

    let locator = gateway_fixture.pull_request(42);
    let result = gateway_fixture.block_on(gateway_fixture.gateway.pull_request(&locator));

    match result {
        Err(IntakeError::RateLimitExceeded {
            rate_limit,
            message,
        }) => {
            assert_eq!(rate_limit, Some(RateLimitInfo::new(RESET_AT)));
            assert_eq!(
                message,
                "pull request failed: API rate limit exceeded for user \
                 (resets at 2023-11-14T22:13:20Z)"
            );
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[rstest]
fn pull_request_commits_preserve_order_and_parents(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/widgets/pulls/42/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "sha": "c1",
                    "commit": { "message": "First change\n\ndetails" },
                    "parents": [{ "sha": "b0" }]
                },
                {
                    "sha": "c2",
                    "commit": { "message": "Second change" },
                    "parents": [{ "sha": "c1" }]
                }
            ]))),
    );

    let locator = gateway_fixture.pull_request(42);
    let commits = gateway_fixture
        .block_on(gateway_fixture.gateway.pull_request_commits(&locator))
        .expect("commits should load");

    let shas: Vec<&str> = commits.iter().map(|commit| commit.sha.as_str()).collect();
    assert_eq!(shas, vec!["c1", "c2"]);
    assert_eq!(commits[0].short_message, "First change");
    assert_eq!(commits[1].parent_shas, vec!["c1".to_owned()]);
}

#[rstest]
fn missing_branch_resolves_to_none(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme-review/widgets/branches/main"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Branch not found"
            }))),
    );
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme-review/widgets/branches/master"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "master",
                "commit": { "sha": "tip" }
            }))),
    );

    let fork = &gateway_fixture.fork;
    let main = gateway_fixture
        .block_on(gateway_fixture.gateway.branch_head(fork, "main"))
        .expect("lookup should succeed");
    let master = gateway_fixture
        .block_on(gateway_fixture.gateway.branch_head(fork, "master"))
        .expect("lookup should succeed");

    assert_eq!(main, None);
    assert_eq!(master.as_deref(), Some("tip"));
}

#[rstest]
fn find_open_pull_request_filters_by_fork_head(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme-review/widgets/pulls"))
            .and(query_param("state", "open"))
            .and(query_param("head", "acme-review:review-pr-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "number": 3,
                "html_url": "https://github.com/acme-review/widgets/pull/3",
                "head": { "ref": "review-pr-42", "sha": "p1" }
            }]))),
    );

    let found = gateway_fixture
        .block_on(
            gateway_fixture
                .gateway
                .find_open_pull_request(&gateway_fixture.fork, "review-pr-42"),
        )
        .expect("lookup should succeed")
        .expect("pull request should be found");

    assert_eq!(found.number, 3);
    assert_eq!(found.head_ref, "review-pr-42");
}

fn review_request() -> NewPullRequest {
    NewPullRequest {
        title: "[Review] Add widgets".to_owned(),
        body: "body".to_owned(),
        head: "review-pr-42".to_owned(),
        base: "base-for-pr-42".to_owned(),
    }
}

#[rstest]
fn duplicate_pull_request_is_recognised(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("POST"))
            .and(path("/api/v3/repos/acme-review/widgets/pulls"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{
                    "resource": "PullRequest",
                    "code": "custom",
                    "message": "A pull request already exists for acme-review:review-pr-42."
                }]
            }))),
    );

    let result = gateway_fixture.block_on(
        gateway_fixture
            .gateway
            .create_pull_request(&gateway_fixture.fork, &review_request()),
    );

    assert_eq!(
        result,
        Err(IntakeError::DuplicatePullRequest {
            head: "review-pr-42".to_owned()
        })
    );
}

#[rstest]
fn invalid_base_is_recognised(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("POST"))
            .and(path("/api/v3/repos/acme-review/widgets/pulls"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{ "resource": "PullRequest", "field": "base", "code": "invalid" }]
            }))),
    );

    let result = gateway_fixture.block_on(
        gateway_fixture
            .gateway
            .create_pull_request(&gateway_fixture.fork, &review_request()),
    );

    assert_eq!(
        result,
        Err(IntakeError::InvalidBaseBranch {
            base: "base-for-pr-42".to_owned()
        })
    );
}

#[rstest]
fn create_pull_request_posts_branches(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("POST"))
            .and(path("/api/v3/repos/acme-review/widgets/pulls"))
            .and(body_partial_json(json!({
                "head": "review-pr-42",
                "base": "base-for-pr-42",
                "title": "[Review] Add widgets"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": 7,
                "html_url": "https://github.com/acme-review/widgets/pull/7",
                "head": { "ref": "review-pr-42" }
            }))),
    );

    let created = gateway_fixture
        .block_on(
            gateway_fixture
                .gateway
                .create_pull_request(&gateway_fixture.fork, &review_request()),
        )
        .expect("pull request should be created");

    assert_eq!(created.number, 7);
}

#[rstest]
fn create_fork_targets_organisation(gateway_fixture: GatewayFixture) {
    gateway_fixture.mount(
        Mock::given(method("POST"))
            .and(path("/api/v3/repos/acme/widgets/forks"))
            .and(body_partial_json(json!({ "organization": "acme-review" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "full_name": "acme-review/widgets",
                "html_url": "https://github.com/acme-review/widgets",
                "default_branch": "main",
                "fork": true
            }))),
    );

    let fork = gateway_fixture
        .block_on(
            gateway_fixture
                .gateway
                .create_fork(&gateway_fixture.source, "acme-review"),
        )
        .expect("fork should be requested");

    assert_eq!(fork.full_name, "acme-review/widgets");
    assert!(fork.fork);
}

#[rstest]
#[case::no_content(204, Ok(()))]
#[case::forbidden(403, Err(()))]
fn disable_actions_reports_status(
    gateway_fixture: GatewayFixture,
    #[case] status: u16,
    #[case] expected: Result<(), ()>,
) {
    let response = if status >= 400 {
        ResponseTemplate::new(status).set_body_json(json!({ "message": "Forbidden" }))
    } else {
        ResponseTemplate::new(status)
    };
    gateway_fixture.mount(
        Mock::given(method("PUT"))
            .and(path("/api/v3/repos/acme-review/widgets/actions/permissions"))
            .and(body_partial_json(json!({ "enabled": false })))
            .respond_with(response),
    );

    let result = gateway_fixture.block_on(
        gateway_fixture
            .gateway
            .disable_actions(&gateway_fixture.fork),
    );

    assert_eq!(result.map_err(|_| ()), expected);
}
