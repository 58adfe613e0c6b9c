//! Private, disposable working clones.
//!
//! Each reproduction request owns exactly one [`WorkingClone`]. Its
//! temporary directory is removed when the value is dropped, which covers
//! success, every error path and panics alike.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::local::{GitCommand, GitCommandError, GitRunner, RemoteUrl};

use super::error::ReproductionError;
use super::retry::UPSTREAM_REMOTE;

const TEMP_PREFIX: &str = "reprise-";
const CHECKOUT_DIR: &str = "repo";
const COMMITTER_NAME: &str = "reprise";
const COMMITTER_EMAIL: &str = "reprise@users.noreply.github.com";

/// A clone of the fork with `origin` (the fork) and `upstream` (the source)
/// remotes configured.
#[derive(Debug)]
pub struct WorkingClone {
    _dir: TempDir,
    path: Utf8PathBuf,
}

impl WorkingClone {
    /// Checkout directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Creates working clones, borrowing objects from a reference mirror when
/// one is available.
#[derive(Clone)]
pub struct WorkingCloneManager {
    runner: Arc<dyn GitRunner>,
    temp_root: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for WorkingCloneManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WorkingCloneManager")
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

impl WorkingCloneManager {
    /// Creates a manager that places clones under the system temp directory.
    #[must_use]
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self {
            runner,
            temp_root: None,
        }
    }

    /// Places clones under `root` instead of the system temp directory.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Clones `fork` and registers `upstream`.
    ///
    /// With a `mirror`, objects are borrowed through `--reference`; the clone
    /// is still independent and safe to mutate.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::CloneFailure`] when the directory cannot
    /// be created or any git step fails. Partial state is removed first.
    pub async fn materialize(
        &self,
        fork: &RemoteUrl,
        upstream: &RemoteUrl,
        mirror: Option<&Utf8Path>,
    ) -> Result<WorkingClone, ReproductionError> {
        let dir = self.temp_dir()?;
        let root = Utf8Path::from_path(dir.path()).ok_or_else(|| ReproductionError::CloneFailure {
            message: format!("temporary path {} is not UTF-8", dir.path().display()),
        })?;
        let path = root.join(CHECKOUT_DIR);

        let clone = match mirror {
            Some(reference) => GitCommand::new(["clone", "--no-single-branch", "--reference"])
                .arg(reference.as_str()),
            None => GitCommand::new(["clone", "--no-single-branch"]),
        }
        .arg(fork.as_str())
        .arg(path.as_str())
        .redacting_opt(fork.secret());

        debug!(mirror = ?mirror, "cloning fork");
        self.runner
            .run(&clone)
            .await
            .map_err(|error| ReproductionError::clone_failure(&error))?;
        self.configure(&path, upstream)
            .await
            .map_err(|error| ReproductionError::clone_failure(&error))?;

        info!(path = %path, borrowed = mirror.is_some(), "working clone ready");
        Ok(WorkingClone { _dir: dir, path })
    }

    fn temp_dir(&self) -> Result<TempDir, ReproductionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|error| ReproductionError::CloneFailure {
            message: format!("could not create temporary directory: {error}"),
        })
    }

    async fn configure(&self, path: &Utf8Path, upstream: &RemoteUrl) -> Result<(), GitCommandError> {
        let steps = [
            GitCommand::new(["remote", "add", UPSTREAM_REMOTE, upstream.as_str()])
                .redacting_opt(upstream.secret()),
            GitCommand::new(["config", "user.name", COMMITTER_NAME]),
            GitCommand::new(["config", "user.email", COMMITTER_EMAIL]),
        ];
        for step in steps {
            self.runner.run(&step.in_dir(path)).await?;
        }
        Ok(())
    }
}
