//! Directory of bare repositories standing in for a git host.
//!
//! Repositories live at `<root>/<owner>/widgets.git`, the layout
//! `RemoteBase::Local` expects.

use std::process::Command;

use camino::Utf8PathBuf;
use reprise::local::test_support::commit_file;
use tempfile::TempDir;

pub const REPOSITORY: &str = "widgets";

/// Temporary git host holding a source repository and its fork.
pub struct GitHost {
    root: TempDir,
}

impl GitHost {
    /// Creates `<source_owner>/widgets.git` with a root commit on `main`
    /// and forks it to `<fork_owner>`. Returns the host and the root SHA.
    pub fn with_fork(source_owner: &str, fork_owner: &str) -> (Self, git2::Oid) {
        let root = TempDir::new()
            .unwrap_or_else(|error| panic!("failed to create git host directory: {error}"));
        let host = Self { root };

        let source = git2::Repository::init_bare(host.repository_path(source_owner))
            .unwrap_or_else(|error| panic!("failed to init source: {error}"));
        let base = commit_file(&source, Some("refs/heads/main"), None, "a.txt", "one\n", "Root")
            .unwrap_or_else(|error| panic!("failed to seed source: {error}"));
        source
            .set_head("refs/heads/main")
            .unwrap_or_else(|error| panic!("failed to set HEAD: {error}"));
        source
            .config()
            .and_then(|mut config| config.set_bool("uploadpack.allowAnySHA1InWant", true))
            .unwrap_or_else(|error| panic!("failed to configure source: {error}"));

        let status = Command::new("git")
            .arg("clone")
            .arg("--bare")
            .arg("--quiet")
            .arg(host.repository_path(source_owner).as_str())
            .arg(host.repository_path(fork_owner).as_str())
            .status()
            .unwrap_or_else(|error| panic!("failed to run git clone: {error}"));
        assert!(status.success(), "forking the source repository failed");

        (host, base)
    }

    /// Directory passed as the git host.
    pub fn base(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.root.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non UTF-8 temp path: {}", path.display()))
    }

    pub fn repository_path(&self, owner: &str) -> Utf8PathBuf {
        self.base().join(owner).join(format!("{REPOSITORY}.git"))
    }

    pub fn open(&self, owner: &str) -> git2::Repository {
        git2::Repository::open_bare(self.repository_path(owner))
            .unwrap_or_else(|error| panic!("failed to open {owner}: {error}"))
    }

    /// Writes a commit to `owner`'s repository.
    pub fn commit(
        &self,
        owner: &str,
        branch: &str,
        parent: git2::Oid,
        change: (&str, &str),
        message: &str,
    ) -> git2::Oid {
        let repository = self.open(owner);
        let (path, contents) = change;
        let reference = format!("refs/heads/{branch}");
        let current = repository
            .find_reference(&reference)
            .ok()
            .and_then(|found| found.target());
        let target_ref = (current.is_none() || current == Some(parent)).then_some(reference);
        commit_file(
            &repository,
            target_ref.as_deref(),
            Some(parent),
            path,
            contents,
            message,
        )
        .unwrap_or_else(|error| panic!("failed to commit to {owner}/{branch}: {error}"))
    }

    /// Tip of `branch` in `owner`'s repository.
    pub fn branch_tip(&self, owner: &str, branch: &str) -> Option<git2::Oid> {
        self.open(owner)
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()
            .and_then(|reference| reference.target())
    }

    /// Contents of `path` at the tip of `branch`.
    pub fn file_on_branch(&self, owner: &str, branch: &str, path: &str) -> Option<String> {
        let repository = self.open(owner);
        let tip = self.branch_tip(owner, branch)?;
        let tree = repository.find_commit(tip).ok()?.tree().ok()?;
        let entry = tree.get_path(std::path::Path::new(path)).ok()?;
        let blob = repository.find_blob(entry.id()).ok()?;
        String::from_utf8(blob.content().to_vec()).ok()
    }

    /// Number of commits between `from` (exclusive) and the tip of `branch`.
    pub fn commits_since(&self, owner: &str, branch: &str, from: git2::Oid) -> usize {
        let repository = self.open(owner);
        let Some(tip) = self.branch_tip(owner, branch) else {
            return 0;
        };
        let mut walk = repository
            .revwalk()
            .unwrap_or_else(|error| panic!("failed to walk history: {error}"));
        walk.push(tip)
            .and_then(|()| walk.hide(from))
            .unwrap_or_else(|error| panic!("failed to bound history: {error}"));
        walk.count()
    }
}
