//! Wiremock responses for the GitHub endpoints a reproduction touches.

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use super::git_host::REPOSITORY;
use super::state::{ReproductionState, ensure_runtime_and_server};

pub(crate) const SOURCE_OWNER: &str = "octo";
pub(crate) const FORK_OWNER: &str = "acme-review";
pub(crate) const REVIEW_PR_NUMBER: u64 = 12;

/// A commit listed on the source pull request.
pub(crate) struct ListedCommit<'a> {
    pub(crate) sha: git2::Oid,
    pub(crate) parent: git2::Oid,
    pub(crate) message: &'a str,
}

/// Pull request as returned by `GET /repos/{owner}/{repo}/pulls/{n}`.
pub(crate) struct PullRequestFixture<'a> {
    pub(crate) number: u64,
    pub(crate) state: &'a str,
    pub(crate) base: git2::Oid,
    pub(crate) head: git2::Oid,
    pub(crate) commits: Vec<ListedCommit<'a>>,
}

fn mount(state: &ReproductionState, mock: Mock) {
    let runtime = ensure_runtime_and_server(state);
    state
        .server
        .with_ref(|server| runtime.block_on(mock.mount(server)))
        .unwrap_or_else(|| panic!("mock server not initialised"));
}

fn api_path(owner: &str, suffix: &str) -> String {
    format!("/api/v3/repos/{owner}/{REPOSITORY}{suffix}")
}

/// Mounts the source pull request and its commit list.
pub(crate) fn mount_pull_request(state: &ReproductionState, fixture: &PullRequestFixture<'_>) {
    let number = fixture.number;
    let body = json!({
        "number": number,
        "title": "Teach widgets to spin",
        "state": fixture.state,
        "merged": false,
        "merge_commit_sha": null,
        "html_url": format!("https://github.com/{SOURCE_OWNER}/{REPOSITORY}/pull/{number}"),
        "user": { "login": "octocat" },
        "base": { "sha": fixture.base.to_string(), "ref": "main" },
        "head": { "sha": fixture.head.to_string(), "ref": "feature" }
    });
    let commits: Vec<Value> = fixture
        .commits
        .iter()
        .map(|commit| {
            json!({
                "sha": commit.sha.to_string(),
                "commit": { "message": commit.message },
                "parents": [{ "sha": commit.parent.to_string() }]
            })
        })
        .collect();

    mount(
        state,
        Mock::given(method("GET"))
            .and(path(api_path(SOURCE_OWNER, &format!("/pulls/{number}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(body)),
    );
    mount(
        state,
        Mock::given(method("GET"))
            .and(path(api_path(SOURCE_OWNER, &format!("/pulls/{number}/commits"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(commits)),
    );
}

/// Mounts an existing fork that accepts new review pull requests.
pub(crate) fn mount_fork(state: &ReproductionState, number: u64) {
    let head = format!("review-pr-{number}");

    mount(
        state,
        Mock::given(method("GET"))
            .and(path(api_path(FORK_OWNER, "")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": format!("{FORK_OWNER}/{REPOSITORY}"),
                "html_url": format!("https://github.com/{FORK_OWNER}/{REPOSITORY}"),
                "default_branch": "main",
                "fork": true
            }))),
    );
    mount(
        state,
        Mock::given(method("PUT"))
            .and(path(api_path(FORK_OWNER, "/actions/permissions")))
            .respond_with(ResponseTemplate::new(204)),
    );
    mount(
        state,
        Mock::given(method("GET"))
            .and(path(api_path(FORK_OWNER, "/pulls")))
            .and(query_param("state", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    mount(
        state,
        Mock::given(method("POST"))
            .and(path(api_path(FORK_OWNER, "/pulls")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": REVIEW_PR_NUMBER,
                "html_url": format!(
                    "https://github.com/{FORK_OWNER}/{REPOSITORY}/pull/{REVIEW_PR_NUMBER}"
                ),
                "head": { "ref": head }
            }))),
    );
}
