//! Test helpers for constructing commit and pull request fixtures.
//!
//! # Examples
//!
//! ```
//! use reprise::github::models::test_support::{commit, merged_pull_request};
//!
//! let pr = merged_pull_request(42, "Add widgets", "m0");
//! assert!(pr.merged);
//! let c = commit("abc1234", "Fix bug", &["p0"]);
//! assert!(!c.is_merge());
//! ```

use super::{CommitRef, PullRequestSnapshot};

/// Constructs a commit with the given SHA, subject and parents.
#[must_use]
pub fn commit(sha: &str, subject: &str, parents: &[&str]) -> CommitRef {
    CommitRef {
        sha: sha.to_owned(),
        short_message: subject.to_owned(),
        parent_shas: parents.iter().map(|parent| (*parent).to_owned()).collect(),
    }
}

/// Constructs an open pull request with live base and head SHAs.
#[must_use]
pub fn open_pull_request(number: u64, title: &str, base: &str, head: &str) -> PullRequestSnapshot {
    PullRequestSnapshot {
        number,
        title: title.to_owned(),
        author: Some("octocat".to_owned()),
        state: "open".to_owned(),
        base_sha: Some(base.to_owned()),
        base_ref: Some("main".to_owned()),
        head_sha: Some(head.to_owned()),
        ..Default::default()
    }
}

/// Constructs a merged pull request with a merge commit SHA.
#[must_use]
pub fn merged_pull_request(number: u64, title: &str, merge_sha: &str) -> PullRequestSnapshot {
    PullRequestSnapshot {
        number,
        title: title.to_owned(),
        author: Some("octocat".to_owned()),
        state: "closed".to_owned(),
        merged: true,
        merge_commit_sha: Some(merge_sha.to_owned()),
        base_ref: Some("main".to_owned()),
        ..Default::default()
    }
}
