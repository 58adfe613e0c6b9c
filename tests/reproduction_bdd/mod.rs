//! Support modules for the reproduction BDD tests.

pub(crate) mod github;
#[path = "../support/git_host.rs"]
pub(crate) mod git_host;
#[path = "../support/runtime.rs"]
pub(crate) mod runtime;
pub(crate) mod state;

pub(crate) use git_host::GitHost;
pub(crate) use github::{
    FORK_OWNER, ListedCommit, PullRequestFixture, REVIEW_PR_NUMBER, SOURCE_OWNER, mount_fork,
    mount_pull_request,
};
pub(crate) use state::{ReproductionState, ensure_runtime_and_server, run_reproduction};
