//! Tests for pushing branches and finding or creating the review pull
//! request.

use std::sync::Arc;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::{PublishBase, PublishMetadata, PullRequestPublisher};
use crate::engine::cherry_pick::BranchPair;
use crate::engine::clone::{WorkingClone, WorkingCloneManager};
use crate::engine::error::ReproductionError;
use crate::github::{
    ForkPullRequest, IntakeError, MockRepositoryGateway, PersonalAccessToken, RepositoryLocator,
};
use crate::local::test_support::ScriptedGitRunner;
use crate::local::{GitRunner, RemoteBase};

struct Workspace {
    _temp: TempDir,
    clone: WorkingClone,
}

#[fixture]
fn fork() -> RepositoryLocator {
    RepositoryLocator::from_owner_repo("acme-review", "widgets").expect("valid repository")
}

async fn workspace() -> Workspace {
    let temp = TempDir::new().expect("temp dir");
    let root = camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8");
    let base = RemoteBase::parse("https://github.com").expect("base");
    let token = PersonalAccessToken::new("ghp_publish").expect("token");
    let remote = base.remote_for(&fork(), &token).expect("remote");
    let clone = WorkingCloneManager::new(Arc::new(ScriptedGitRunner::new()))
        .with_temp_root(root)
        .materialize(&remote, &remote, None)
        .await
        .expect("scripted clone");
    Workspace { _temp: temp, clone }
}

fn review_pull_request(number: u64) -> ForkPullRequest {
    ForkPullRequest {
        number,
        html_url: format!("https://github.com/acme-review/widgets/pull/{number}"),
        head_ref: "review-pr-42".to_owned(),
    }
}

fn metadata(base: PublishBase) -> PublishMetadata {
    PublishMetadata {
        title: "[Review] Add widgets".to_owned(),
        body: "Reproduction of acme/widgets#42 for review.".to_owned(),
        base,
    }
}

fn publisher(
    runner: &Arc<ScriptedGitRunner>,
    gateway: MockRepositoryGateway,
) -> PullRequestPublisher {
    PullRequestPublisher::new(Arc::clone(runner) as Arc<dyn GitRunner>, Arc::new(gateway))
}

#[rstest]
#[tokio::test]
async fn creates_pull_request_against_base_branch(fork: RepositoryLocator) {
    let work = workspace().await;
    let runner = Arc::new(ScriptedGitRunner::new());
    let mut gateway = MockRepositoryGateway::new();
    gateway
        .expect_find_open_pull_request()
        .returning(|_, _| Ok(None));
    gateway
        .expect_create_pull_request()
        .withf(|_, request| {
            request.base == "base-for-pr-42"
                && request.head == "review-pr-42"
                && request.title == "[Review] Add widgets"
        })
        .times(1)
        .returning(|_, _| Ok(review_pull_request(5)));

    let outcome = publisher(&runner, gateway)
        .publish(
            &work.clone,
            &fork,
            &BranchPair::for_pull_request(42),
            &metadata(PublishBase::Branch("base-for-pr-42".to_owned())),
        )
        .await
        .expect("publish should succeed");

    assert!(!outcome.reused);
    assert_eq!(outcome.number, 5);
    let pushes: Vec<String> = runner
        .calls()
        .iter()
        .map(|args| args.join(" "))
        .collect();
    assert_eq!(
        pushes,
        vec![
            "push --force origin refs/heads/base-for-pr-42:refs/heads/base-for-pr-42",
            "push --force origin refs/heads/review-pr-42:refs/heads/review-pr-42",
        ]
    );
}

#[rstest]
#[tokio::test]
async fn open_pull_request_is_reused(fork: RepositoryLocator) {
    let work = workspace().await;
    let runner = Arc::new(ScriptedGitRunner::new());
    let mut gateway = MockRepositoryGateway::new();
    gateway
        .expect_find_open_pull_request()
        .withf(|_, head| head == "review-pr-42")
        .returning(|_, _| Ok(Some(review_pull_request(5))));
    gateway.expect_create_pull_request().never();

    let outcome = publisher(&runner, gateway)
        .publish(
            &work.clone,
            &fork,
            &BranchPair::for_pull_request(42),
            &metadata(PublishBase::Branch("base-for-pr-42".to_owned())),
        )
        .await
        .expect("publish should succeed");

    assert!(outcome.reused);
    assert_eq!(outcome.pr_url, "https://github.com/acme-review/widgets/pull/5");
}

#[rstest]
#[tokio::test]
async fn duplicate_on_create_is_rediscovered(fork: RepositoryLocator) {
    let work = workspace().await;
    let runner = Arc::new(ScriptedGitRunner::new());
    let mut gateway = MockRepositoryGateway::new();
    let mut lookups = 0;
    gateway.expect_find_open_pull_request().returning(move |_, _| {
        lookups += 1;
        Ok((lookups > 1).then(|| review_pull_request(6)))
    });
    gateway.expect_create_pull_request().returning(|_, _| {
        Err(IntakeError::DuplicatePullRequest {
            head: "review-pr-42".to_owned(),
        })
    });

    let outcome = publisher(&runner, gateway)
        .publish(
            &work.clone,
            &fork,
            &BranchPair::for_pull_request(42),
            &metadata(PublishBase::Branch("base-for-pr-42".to_owned())),
        )
        .await
        .expect("duplicate should resolve");

    assert!(outcome.reused);
    assert_eq!(outcome.number, 6);
}

#[rstest]
#[tokio::test]
async fn missing_main_falls_back_to_master(fork: RepositoryLocator) {
    let work = workspace().await;
    let runner = Arc::new(ScriptedGitRunner::new());
    let mut gateway = MockRepositoryGateway::new();
    gateway
        .expect_find_open_pull_request()
        .returning(|_, _| Ok(None));
    gateway
        .expect_create_pull_request()
        .withf(|_, request| request.base == "main")
        .times(1)
        .returning(|_, _| {
            Err(IntakeError::InvalidBaseBranch {
                base: "main".to_owned(),
            })
        });
    gateway
        .expect_create_pull_request()
        .withf(|_, request| request.base == "master")
        .times(1)
        .returning(|_, _| Ok(review_pull_request(8)));

    let outcome = publisher(&runner, gateway)
        .publish(
            &work.clone,
            &fork,
            &BranchPair::for_commit("abc1234"),
            &metadata(PublishBase::default_branch()),
        )
        .await
        .expect("alternate base should work");

    assert_eq!(outcome.number, 8);
    assert_eq!(runner.count(&["push"]), 1);
}

#[rstest]
#[tokio::test]
async fn push_failure_stops_before_github(fork: RepositoryLocator) {
    let work = workspace().await;
    let runner = Arc::new(
        ScriptedGitRunner::new().fail_always(&["push"], "remote: Permission denied"),
    );
    let mut gateway = MockRepositoryGateway::new();
    gateway.expect_find_open_pull_request().never();
    gateway.expect_create_pull_request().never();

    let error = publisher(&runner, gateway)
        .publish(
            &work.clone,
            &fork,
            &BranchPair::for_pull_request(42),
            &metadata(PublishBase::Branch("base-for-pr-42".to_owned())),
        )
        .await
        .expect_err("push should fail");

    let ReproductionError::PushFailure { branch, message } = error else {
        panic!("expected push failure, got {error:?}");
    };
    assert_eq!(branch, "base-for-pr-42");
    assert!(message.contains("Permission denied"));
}

#[rstest]
#[tokio::test]
async fn api_failure_is_a_publish_failure(fork: RepositoryLocator) {
    let work = workspace().await;
    let runner = Arc::new(ScriptedGitRunner::new());
    let mut gateway = MockRepositoryGateway::new();
    gateway
        .expect_find_open_pull_request()
        .returning(|_, _| Ok(None));
    gateway.expect_create_pull_request().returning(|_, _| {
        Err(IntakeError::Api {
            message: "Validation Failed".to_owned(),
        })
    });

    let error = publisher(&runner, gateway)
        .publish(
            &work.clone,
            &fork,
            &BranchPair::for_pull_request(42),
            &metadata(PublishBase::Branch("base-for-pr-42".to_owned())),
        )
        .await
        .expect_err("creation should fail");

    assert!(matches!(error, ReproductionError::PublishFailure { .. }));
}
