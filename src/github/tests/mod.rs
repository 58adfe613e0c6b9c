//! Unit tests for the GitHub intake module.

use mockall::predicate::always;
use rstest::rstest;

use super::models::test_support::{commit, open_pull_request};
use super::{
    CommitSha, IntakeError, MockPullRequestGateway, PersonalAccessToken, PullRequestIntake,
    PullRequestLocator, RepositoryLocator,
};

fn sample_locator() -> PullRequestLocator {
    PullRequestLocator::parse("https://github.com/acme/widgets/pull/42")
        .expect("sample locator should parse")
}

#[rstest]
fn parses_standard_github_url_segments() {
    let locator = PullRequestLocator::parse("https://github.com/acme/widgets/pull/12/files")
        .expect("should parse standard GitHub URL");
    assert_eq!(locator.repository().owner().as_str(), "acme", "owner mismatch");
    assert_eq!(
        locator.repository().repository().as_str(),
        "widgets",
        "repository mismatch"
    );
    assert_eq!(locator.number().get(), 12_u64, "number mismatch");
    assert_eq!(
        locator.repository().api_base().as_str(),
        "https://api.github.com/",
        "api base mismatch"
    );
}

#[rstest]
fn parses_enterprise_url() {
    let locator = PullRequestLocator::parse("https://ghe.example.com/foo/bar/pull/7")
        .expect("should parse enterprise URL");
    assert_eq!(
        locator.repository().api_base().as_str(),
        "https://ghe.example.com/api/v3",
        "enterprise api base mismatch"
    );
}

#[rstest]
#[case::missing_number("https://github.com/acme/widgets/pull/")]
#[case::issues_path("https://github.com/acme/widgets/issues/3")]
#[case::repository_only("https://github.com/acme/widgets")]
fn rejects_incomplete_pull_request_paths(#[case] input: &str) {
    let result = PullRequestLocator::parse(input);
    assert!(
        matches!(result, Err(IntakeError::MissingPathSegments)),
        "expected MissingPathSegments, got {result:?}"
    );
}

#[rstest]
#[case::zero("https://github.com/acme/widgets/pull/0")]
#[case::not_a_number("https://github.com/acme/widgets/pull/abc")]
fn rejects_invalid_numbers(#[case] input: &str) {
    let result = PullRequestLocator::parse(input);
    assert!(
        matches!(result, Err(IntakeError::InvalidPullRequestNumber)),
        "expected InvalidPullRequestNumber, got {result:?}"
    );
}

#[rstest]
fn rejects_invalid_url() {
    let result = PullRequestLocator::parse("not a url");
    assert!(
        matches!(result, Err(IntakeError::InvalidUrl(_))),
        "expected InvalidUrl, got {result:?}"
    );
}

#[rstest]
fn rejects_empty_token() {
    let result = PersonalAccessToken::new("   ");
    assert!(
        matches!(result, Err(IntakeError::MissingToken)),
        "expected MissingToken, got {result:?}"
    );
}

#[rstest]
fn token_debug_output_is_redacted() {
    let token = PersonalAccessToken::new("ghp_secret").expect("token should be valid");
    assert!(!format!("{token:?}").contains("ghp_secret"));
}

#[rstest]
#[case::github("https://github.com/acme/widgets", "acme/widgets")]
#[case::git_suffix("https://github.com/acme/widgets.git", "acme/widgets")]
#[case::trailing_path("https://github.com/acme/widgets/tree/main", "acme/widgets")]
fn repository_urls_produce_owner_name_key(#[case] input: &str, #[case] expected: &str) {
    let locator = RepositoryLocator::parse(input).expect("should parse repository URL");
    assert_eq!(locator.key(), expected);
}

#[rstest]
fn fork_locator_keeps_host_and_name() {
    let source = RepositoryLocator::parse("https://ghe.example.com/acme/widgets")
        .expect("should parse repository URL");
    let fork = source.with_owner("acme-review").expect("should address fork");
    assert_eq!(fork.key(), "acme-review/widgets");
    assert_eq!(fork.api_base(), source.api_base());
}

#[rstest]
fn repository_locator_rejects_empty_owner() {
    let result = RepositoryLocator::from_owner_repo("", "widgets");
    assert!(matches!(result, Err(IntakeError::MissingPathSegments)));
}

#[rstest]
#[case::full("0123456789ABCDEF0123456789abcdef01234567", "0123456")]
#[case::abbreviated("abc1234", "abc1234")]
fn commit_sha_normalises_and_abbreviates(#[case] input: &str, #[case] short: &str) {
    let sha = CommitSha::parse(input).expect("sha should be valid");
    assert_eq!(sha.as_str(), input.to_ascii_lowercase());
    assert_eq!(sha.short(), short);
}

#[rstest]
#[case::too_short("abc12")]
#[case::not_hex("zzzzzzz")]
#[case::too_long("0123456789abcdef0123456789abcdef012345678")]
fn commit_sha_rejects_malformed_values(#[case] input: &str) {
    let result = CommitSha::parse(input);
    assert!(
        matches!(result, Err(IntakeError::InvalidCommitSha { .. })),
        "expected InvalidCommitSha, got {result:?}"
    );
}

fn setup_pull_request_gateway() -> MockPullRequestGateway {
    let mut gateway = MockPullRequestGateway::new();
    gateway
        .expect_pull_request()
        .with(always())
        .times(1)
        .returning(|_| Ok(open_pull_request(42, "Add widgets", "b0", "h0")));
    gateway
        .expect_pull_request_commits()
        .with(always())
        .times(1)
        .returning(|_| {
            Ok(vec![
                commit("c1", "First change", &["b0"]),
                commit("c2", "Second change", &["c1"]),
            ])
        });
    gateway
}

#[tokio::test]
async fn intake_attaches_commits_to_snapshot() {
    let locator = sample_locator();
    let gateway = setup_pull_request_gateway();

    let intake = PullRequestIntake::new(&gateway);
    let snapshot = intake.load(&locator).await.expect("intake should succeed");

    assert_eq!(snapshot.number, 42, "number mismatch");
    assert_eq!(snapshot.title, "Add widgets", "title mismatch");
    assert_eq!(snapshot.commits.len(), 2, "commit count mismatch");
    assert_eq!(
        snapshot.commits.first().map(|c| c.sha.as_str()),
        Some("c1"),
        "first commit mismatch"
    );
}

#[tokio::test]
async fn intake_propagates_gateway_errors() {
    let locator = sample_locator();
    let mut gateway = MockPullRequestGateway::new();
    gateway.expect_pull_request().returning(|_| {
        Err(IntakeError::NotFound {
            resource: "pull request".to_owned(),
        })
    });

    let intake = PullRequestIntake::new(&gateway);
    let result = intake.load(&locator).await;

    assert!(
        matches!(result, Err(ref error) if error.is_not_found()),
        "expected NotFound, got {result:?}"
    );
}
