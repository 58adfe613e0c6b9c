//! Disk-backed reference mirrors used as `--reference` donors.
//!
//! Mirrors live at `<cache_root>/<owner>/<name>` and are only created for
//! repositories the [`CachePolicy`] admits. Every clone or fetch runs under
//! the [`RepoLockManager`] guard for the repository key. Mirrors are never
//! deleted here except to discard a failed or corrupt clone.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::github::RepositoryLocator;
use crate::local::{GitCommand, GitCommandError, GitRunner, RemoteUrl};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

use super::lock::RepoLockManager;

/// Minimum interval between clone progress callbacks.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Decides which repositories may be mirrored.
pub trait CachePolicy: Send + Sync {
    /// Returns true when `repository` may be cached.
    fn is_cacheable(&self, repository: &RepositoryLocator) -> bool;
}

/// Policy admitting an explicit list of `owner/name` keys.
#[derive(Debug, Clone, Default)]
pub struct AllowListPolicy {
    keys: HashSet<String>,
}

impl AllowListPolicy {
    /// Builds a policy from `owner/name` keys; matching ignores case.
    #[must_use]
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|key| key.as_ref().trim().to_ascii_lowercase())
                .filter(|key| !key.is_empty())
                .collect(),
        }
    }
}

impl CachePolicy for AllowListPolicy {
    fn is_cacheable(&self, repository: &RepositoryLocator) -> bool {
        self.keys.contains(&repository.key().to_ascii_lowercase())
    }
}

/// A mirror on disk after a successful `ensure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Repository key, `owner/name`.
    pub repo_key: String,
    /// Mirror location.
    pub path: Utf8PathBuf,
    /// When the mirror was last cloned or fetched.
    pub last_synced_at: DateTime<Utc>,
    /// True when this call created the mirror.
    pub cloned: bool,
}

/// Stage reported by `git clone --progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClonePhase {
    /// `Counting objects`
    Counting,
    /// `Compressing objects`
    Compressing,
    /// `Receiving objects`
    Receiving,
    /// `Resolving deltas`
    Resolving,
}

impl ClonePhase {
    /// Label as git prints it.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Counting => "Counting objects",
            Self::Compressing => "Compressing objects",
            Self::Receiving => "Receiving objects",
            Self::Resolving => "Resolving deltas",
        }
    }
}

/// One parsed progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneProgress {
    /// Clone stage.
    pub phase: ClonePhase,
    /// Completion of the stage, 0 to 100.
    pub percent: u8,
}

impl CloneProgress {
    /// Parses lines such as `remote: Counting objects:  45% (45/100)` or
    /// `Receiving objects: 100% (10/10), 1.2 MiB | 3 MiB/s, done.`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        let body = trimmed.strip_prefix("remote:").map_or(trimmed, str::trim_start);
        let (label, rest) = body.split_once(':')?;
        let phase = match label.trim() {
            "Counting objects" | "Enumerating objects" => ClonePhase::Counting,
            "Compressing objects" => ClonePhase::Compressing,
            "Receiving objects" => ClonePhase::Receiving,
            "Resolving deltas" => ClonePhase::Resolving,
            _ => return None,
        };
        let (percent_text, _) = rest.trim_start().split_once('%')?;
        let percent = percent_text.trim().parse::<u8>().ok()?.min(100);
        Some(Self { phase, percent })
    }
}

impl std::fmt::Display for CloneProgress {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}: {}%", self.phase.label(), self.percent)
    }
}

/// Lets through at most one event per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ProgressThrottle {
    /// Creates a throttle with the given interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Returns true when an event may be emitted now, and records it.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let due = last.is_none_or(|previous| now.duration_since(previous) >= self.interval);
        if due {
            *last = Some(now);
        }
        due
    }
}

/// Shared reference mirror store.
pub struct ReferenceRepoCache {
    root: Utf8PathBuf,
    runner: Arc<dyn GitRunner>,
    locks: RepoLockManager,
    policy: Arc<dyn CachePolicy>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for ReferenceRepoCache {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReferenceRepoCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ReferenceRepoCache {
    /// Creates a cache rooted at `root`.
    #[must_use]
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        runner: Arc<dyn GitRunner>,
        locks: RepoLockManager,
        policy: Arc<dyn CachePolicy>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            root: root.into(),
            runner,
            locks,
            policy,
            telemetry,
        }
    }

    /// Deterministic mirror location for `repository`.
    #[must_use]
    pub fn mirror_path(&self, repository: &RepositoryLocator) -> Utf8PathBuf {
        self.root
            .join(repository.owner().as_str())
            .join(repository.repository().as_str())
    }

    /// Returns the mirror path when a readable mirror exists.
    #[must_use]
    pub fn existing_mirror(&self, repository: &RepositoryLocator) -> Option<Utf8PathBuf> {
        let path = self.mirror_path(repository);
        is_valid_mirror(&path).then_some(path)
    }

    /// Like [`Self::existing_mirror`], but first waits out any clone or
    /// fetch of `repository` that holds its lock.
    pub async fn settled_mirror(&self, repository: &RepositoryLocator) -> Option<Utf8PathBuf> {
        let _guard = self.locks.acquire(&repository.key()).await;
        self.existing_mirror(repository)
    }

    /// Returns true when `repository` would be mirrored, either by policy or
    /// because the caller asked for it.
    #[must_use]
    pub fn admits(&self, repository: &RepositoryLocator, requested: bool) -> bool {
        requested || self.policy.is_cacheable(repository)
    }

    /// Clones or refreshes the mirror for `repository`.
    ///
    /// Returns `Ok(None)` without touching disk when the repository is not
    /// admitted. `on_progress` receives throttled clone progress.
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError`] when the clone or fetch fails. A failed
    /// clone removes the partially written mirror first.
    pub async fn ensure(
        &self,
        repository: &RepositoryLocator,
        remote: &RemoteUrl,
        requested: bool,
        on_progress: &(dyn Fn(CloneProgress) + Send + Sync),
    ) -> Result<Option<CacheEntry>, GitCommandError> {
        if !self.admits(repository, requested) {
            return Ok(None);
        }

        let key = repository.key();
        let _guard = self.locks.acquire(&key).await;
        let path = self.mirror_path(repository);
        let started = Instant::now();

        let cloned = if is_valid_mirror(&path) {
            self.fetch(&path, remote).await?;
            false
        } else {
            self.clone_mirror(&path, remote, on_progress).await?;
            true
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(repo = %key, cloned, elapsed_ms, "reference mirror synced");
        self.telemetry.record(TelemetryEvent::ReferenceCacheSynced {
            repo: key.clone(),
            cloned,
            elapsed_ms,
        });

        Ok(Some(CacheEntry {
            repo_key: key,
            path,
            last_synced_at: Utc::now(),
            cloned,
        }))
    }

    async fn fetch(&self, path: &Utf8Path, remote: &RemoteUrl) -> Result<(), GitCommandError> {
        let command = GitCommand::new(["fetch", "--prune", "--quiet"])
            .arg(remote.as_str())
            .arg("+refs/heads/*:refs/heads/*")
            .arg("+refs/tags/*:refs/tags/*")
            .in_dir(path)
            .redacting_opt(remote.secret());
        self.runner.run(&command).await.map(drop)
    }

    async fn clone_mirror(
        &self,
        path: &Utf8Path,
        remote: &RemoteUrl,
        on_progress: &(dyn Fn(CloneProgress) + Send + Sync),
    ) -> Result<(), GitCommandError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            warn!(path = %path, "discarding unreadable reference mirror");
            remove_dir(path).await;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| GitCommandError::Spawn {
                    command: format!("create {parent}"),
                    message: error.to_string(),
                })?;
        }

        let throttle = ProgressThrottle::new(PROGRESS_INTERVAL);
        let forward = |line: &str| {
            if let Some(progress) = CloneProgress::parse(line)
                && throttle.admit()
            {
                on_progress(progress);
            }
        };

        let clone = GitCommand::new(["clone", "--mirror", "--progress"])
            .arg(remote.as_str())
            .arg(path.as_str())
            .redacting_opt(remote.secret());
        if let Err(error) = self.runner.run_streaming(&clone, &forward).await {
            remove_dir(path).await;
            return Err(error);
        }

        // Keep the token out of the mirror's stored configuration.
        let reset_url = GitCommand::new(["remote", "set-url", "origin"])
            .arg(remote.without_credentials())
            .in_dir(path);
        if let Err(error) = self.runner.run(&reset_url).await {
            remove_dir(path).await;
            return Err(error);
        }
        Ok(())
    }
}

fn is_valid_mirror(path: &Utf8Path) -> bool {
    git2::Repository::open_bare(path).is_ok()
}

async fn remove_dir(path: &Utf8Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path, %error, "could not remove mirror directory"),
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
