//! Orchestration of one reproduction request across the ten-step plan.
//!
//! [`ReproductionEngine::start`] runs a request on its own task and hands
//! back the [`ProgressReceiver`]. Whatever happens inside the pipeline,
//! including a panic, the receiver gets exactly one terminal
//! [`ReproductionResult`], and the request's working clone is gone before
//! that result is sent.
//!
//! Dropping the receiver cancels the request at the next step boundary. Git
//! subprocesses are spawned with kill-on-drop, so the command in flight when
//! the pipeline future is dropped is terminated too.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::{debug, error, info, warn};

use crate::github::locator::short_sha;
use crate::github::{
    CommitSha, IntakeError, PersonalAccessToken, PullRequestGateway, PullRequestIntake,
    PullRequestLocator, PullRequestSnapshot, RepositoryGateway, RepositoryInfo, RepositoryLocator,
};
use crate::local::{GitRunner, RemoteBase, RemoteUrl};
use crate::persistence::{ForkRecord, PersistenceError, ReproductionLedger, ReproductionRecord};
use crate::telemetry::{NoopTelemetrySink, TelemetryEvent, TelemetrySink};

use super::cache::{CloneProgress, ReferenceRepoCache};
use super::cherry_pick::{BranchPair, CherryPickEngine};
use super::clone::{WorkingClone, WorkingCloneManager};
use super::error::ReproductionError;
use super::progress::{
    PipelineStep, ProgressChannel, ProgressReceiver, ReproductionResult, progress_channel,
};
use super::publish::{PublishBase, PublishMetadata, PublishOutcome, PullRequestPublisher};
use super::render::{ReviewDescription, render_body, review_title};
use super::retry::FetchRetryPolicy;
use super::strategy::{ReproductionPlan, StrategySelector};

const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

/// What to reproduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReproductionSource {
    /// A pull request URL.
    PullRequest(PullRequestLocator),
    /// A repository, optionally pinned to a commit. Without a commit the
    /// tip of the fork's default branch is reproduced.
    Repository {
        /// Source repository.
        repository: RepositoryLocator,
        /// Commit to reproduce.
        commit: Option<CommitSha>,
    },
}

impl ReproductionSource {
    /// Source repository.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryLocator {
        match self {
            Self::PullRequest(locator) => locator.repository(),
            Self::Repository { repository, .. } => repository,
        }
    }
}

impl fmt::Display for ReproductionSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullRequest(locator) => {
                write!(formatter, "{}#{}", locator.repository(), locator.number())
            }
            Self::Repository {
                repository,
                commit: Some(sha),
            } => write!(formatter, "{repository}@{}", sha.short()),
            Self::Repository {
                repository,
                commit: None,
            } => write!(formatter, "{repository}"),
        }
    }
}

/// One reproduction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReproductionRequest {
    /// What to reproduce.
    pub source: ReproductionSource,
    /// Mirror the source repository even when the cache policy would not.
    pub cache_repo: bool,
}

/// Settings shared by every request an engine runs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Organisation that owns the forks.
    pub fork_org: String,
    /// Token used for git remotes. Requests fail with a configuration error
    /// when it is absent.
    pub token: Option<PersonalAccessToken>,
    /// Where git remotes live.
    pub remote_base: RemoteBase,
    /// How many times to poll for a newly requested fork.
    pub fork_poll_attempts: u32,
    /// Delay before each poll.
    pub fork_poll_interval: Duration,
}

/// Runs reproduction requests.
///
/// Requests are independent; the only state they share is the reference
/// cache, which serialises its own mutations per repository.
pub struct ReproductionEngine {
    pulls: Arc<dyn PullRequestGateway>,
    repos: Arc<dyn RepositoryGateway>,
    runner: Arc<dyn GitRunner>,
    cache: Option<Arc<ReferenceRepoCache>>,
    clones: WorkingCloneManager,
    ledger: Option<Arc<dyn ReproductionLedger>>,
    telemetry: Arc<dyn TelemetrySink>,
    settings: EngineSettings,
}

impl fmt::Debug for ReproductionEngine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReproductionEngine")
            .field("cache", &self.cache)
            .field("clones", &self.clones)
            .field("ledger", &self.ledger.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Facts known once a request has published its pull request.
#[derive(Debug)]
struct Published {
    outcome: PublishOutcome,
    fork_url: String,
    commit_count: usize,
}

/// Per-request bookkeeping: the current step and the fork URL once known.
struct Run<'channel> {
    channel: &'channel ProgressChannel,
    step: PipelineStep,
    fork_url: Option<String>,
}

impl<'channel> Run<'channel> {
    const fn new(channel: &'channel ProgressChannel) -> Self {
        Self {
            channel,
            step: PipelineStep::ValidateConfig,
            fork_url: None,
        }
    }

    fn enter(
        &mut self,
        step: PipelineStep,
        message: impl Into<String>,
    ) -> Result<(), ReproductionError> {
        if self.channel.is_closed() {
            return Err(ReproductionError::Cancelled);
        }
        self.step = step;
        self.channel.info(step, message);
        Ok(())
    }

    fn done(&self, message: impl Into<String>) {
        self.channel.success(self.step, message);
    }
}

impl ReproductionEngine {
    /// Creates an engine without a cache, ledger or telemetry.
    #[must_use]
    pub fn new(
        pulls: Arc<dyn PullRequestGateway>,
        repos: Arc<dyn RepositoryGateway>,
        runner: Arc<dyn GitRunner>,
        settings: EngineSettings,
    ) -> Self {
        let clones = WorkingCloneManager::new(Arc::clone(&runner));
        Self {
            pulls,
            repos,
            runner,
            cache: None,
            clones,
            ledger: None,
            telemetry: Arc::new(NoopTelemetrySink),
            settings,
        }
    }

    /// Borrows objects from `cache` when cloning.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ReferenceRepoCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Consults and updates `ledger`.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn ReproductionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Records request outcomes to `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replaces the working clone manager, for example to move clones off
    /// the system temp directory.
    #[must_use]
    pub fn with_clone_manager(mut self, clones: WorkingCloneManager) -> Self {
        self.clones = clones;
        self
    }

    /// Starts `request` on a new task and returns its progress stream.
    ///
    /// A supervising task turns a panic in the pipeline into a failed
    /// result. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(self: &Arc<Self>, request: ReproductionRequest) -> ProgressReceiver {
        let (channel, receiver) = progress_channel();
        let worker = Arc::clone(self);
        let worker_channel = channel.clone();
        let handle = tokio::spawn(async move { worker.run(&request, &worker_channel).await });

        tokio::spawn(async move {
            if let Err(join_error) = handle.await {
                error!(error = %join_error, "reproduction task aborted");
                let failure = ReproductionError::Internal {
                    message: format!("reproduction task aborted: {join_error}"),
                };
                channel.finish(ReproductionResult::failure(failure.to_string()));
            }
        });
        receiver
    }

    /// Runs `request` to completion on the current task, reporting through
    /// `channel`, and returns the result it sent.
    pub async fn run(
        &self,
        request: &ReproductionRequest,
        channel: &ProgressChannel,
    ) -> ReproductionResult {
        let mut run = Run::new(channel);
        let outcome = self.reproduce(request, &mut run).await;

        let result = match outcome {
            Ok(published) => ReproductionResult {
                success: true,
                pr_url: Some(published.outcome.pr_url),
                fork_url: Some(published.fork_url),
                commit_count: Some(published.commit_count),
                reused: published.outcome.reused,
                error: None,
            },
            Err(failure) => {
                warn!(
                    source = %request.source,
                    step = run.step.number(),
                    error = %failure,
                    "reproduction failed"
                );
                channel.error(run.step, failure.to_string());
                ReproductionResult {
                    fork_url: run.fork_url,
                    ..ReproductionResult::failure(failure.to_string())
                }
            }
        };

        self.telemetry.record(TelemetryEvent::ReproductionFinished {
            source: request.source.to_string(),
            success: result.success,
            reused: result.reused,
        });
        channel.finish(result.clone());
        result
    }

    async fn reproduce(
        &self,
        request: &ReproductionRequest,
        run: &mut Run<'_>,
    ) -> Result<Published, ReproductionError> {
        run.enter(PipelineStep::ValidateConfig, "validating configuration")?;
        let token = self.settings.token.as_ref().ok_or_else(|| ReproductionError::Config {
            message: "a GitHub token is required (use --token or GITHUB_TOKEN)".to_owned(),
        })?;
        let source_repo = request.source.repository();
        let fork_repo = self.fork_locator(source_repo)?;
        run.done(format!("forks go to {}", fork_repo.owner().as_str()));

        run.enter(PipelineStep::ResolveSource, format!("resolving {}", request.source))?;
        let resolved = self.resolve_source(&request.source, &fork_repo, run).await?;
        run.done(resolved.describe());

        run.enter(PipelineStep::FetchStrategyInputs, "choosing a reproduction strategy")?;
        let plan = self.select_strategy(source_repo, &resolved).await?;
        let branches = resolved.branches();
        run.done(format!(
            "{} with {} commit(s)",
            plan.strategy.label(),
            plan.commit_count()
        ));

        run.enter(PipelineStep::CheckFork, format!("looking up fork {fork_repo}"))?;
        let fork_url = match run.fork_url.clone() {
            Some(known) => known,
            None => self.ensure_fork(source_repo, &fork_repo, run).await?,
        };
        run.fork_url = Some(fork_url.clone());
        run.done(format!("fork ready at {fork_url}"));

        run.enter(PipelineStep::VerifyForkConfig, "disabling GitHub Actions on the fork")?;
        match self.repos.disable_actions(&fork_repo).await {
            Ok(()) => run.done("GitHub Actions disabled"),
            Err(failure) => {
                warn!(fork = %fork_repo, error = %failure, "could not disable GitHub Actions");
                run.channel.info(
                    PipelineStep::VerifyForkConfig,
                    format!("continuing with Actions enabled: {failure}"),
                );
            }
        }

        run.enter(PipelineStep::Clone, "cloning the fork")?;
        let base = &self.settings.remote_base;
        let upstream_remote = base
            .remote_for(source_repo, token)
            .map_err(|failure| ReproductionError::clone_failure(&failure))?;
        let fork_remote = base
            .remote_for(&fork_repo, token)
            .map_err(|failure| ReproductionError::clone_failure(&failure))?;
        let mirror = self
            .reference_mirror(source_repo, &upstream_remote, request.cache_repo, run)
            .await;
        let clone = self
            .clones
            .materialize(&fork_remote, &upstream_remote, mirror.as_deref())
            .await?;
        run.done(if mirror.is_some() {
            "working clone ready (objects borrowed from the reference mirror)"
        } else {
            "working clone ready"
        });

        let published = self
            .build_and_publish(&clone, &resolved, &plan, &branches, &fork_repo, run)
            .await?;
        drop(clone);

        Ok(Published {
            outcome: published,
            fork_url,
            commit_count: plan.commit_count(),
        })
    }

    async fn build_and_publish(
        &self,
        clone: &WorkingClone,
        resolved: &ResolvedSource,
        plan: &ReproductionPlan,
        branches: &BranchPair,
        fork_repo: &RepositoryLocator,
        run: &mut Run<'_>,
    ) -> Result<PublishOutcome, ReproductionError> {
        let policy = FetchRetryPolicy::new(self.runner.as_ref(), clone.path());
        let cherry_pick = CherryPickEngine::new(policy);

        run.enter(PipelineStep::FetchCommits, "fetching commits from upstream")?;
        let targets = plan.strategy.fetch_targets();
        for (index, sha) in targets.iter().enumerate() {
            if let Err(failure) = policy.fetch(sha).await {
                debug!(sha, error = %failure, "fetch failed; relying on cloned history");
            }
            run.channel.progress(
                PipelineStep::FetchCommits,
                format!("fetched {}/{}", index + 1, targets.len()),
            );
        }
        run.done(format!("{} object(s) requested", targets.len()));

        run.enter(
            PipelineStep::BuildBranches,
            format!("creating {} and {}", branches.base, branches.review),
        )?;
        cherry_pick.prepare(&plan.strategy, branches).await?;
        run.done("branches created");

        run.enter(PipelineStep::ApplyCommits, "applying commits")?;
        let commits = plan.strategy.replayed_commits();
        if commits.is_empty() {
            run.done(format!("nothing to replay for {}", plan.strategy.label()));
        } else {
            cherry_pick.replay(commits, branches).await?;
            run.done(format!("{} commit(s) applied", commits.len()));
        }

        run.enter(PipelineStep::Publish, format!("pushing to {fork_repo}"))?;
        let source_ref = resolved.source_ref();

        let metadata = PublishMetadata {
            title: review_title(plan.subject()),
            body: render_body(&ReviewDescription {
                source_ref: source_ref.clone(),
                source_url: resolved.source_url(&self.settings.remote_base),
                author: plan
                    .pull_request
                    .as_ref()
                    .and_then(|snapshot| snapshot.author.clone()),
                strategy: plan.strategy.label().to_owned(),
                commit_count: plan.commit_count(),
            })?,
            base: if plan.strategy.has_base_branch() {
                PublishBase::Branch(branches.base.clone())
            } else {
                PublishBase::default_branch()
            },
        };
        let outcome = PullRequestPublisher::new(Arc::clone(&self.runner), Arc::clone(&self.repos))
            .publish(clone, fork_repo, branches, &metadata)
            .await?;

        let record = ReproductionRecord {
            source_ref,
            fork: fork_repo.key(),
            head_branch: branches.review.clone(),
            pr_url: outcome.pr_url.clone(),
            pr_number: outcome.number,
        };
        self.ledger_call("record_reproduction", move |ledger: &dyn ReproductionLedger| {
            ledger.record_reproduction(&record)
        })
        .await;

        run.done(if outcome.reused {
            format!("reusing {}", outcome.pr_url)
        } else {
            format!("opened {}", outcome.pr_url)
        });
        Ok(outcome)
    }

    fn fork_locator(
        &self,
        source: &RepositoryLocator,
    ) -> Result<RepositoryLocator, ReproductionError> {
        let organisation = self.settings.fork_org.trim();
        if organisation.is_empty() {
            return Err(ReproductionError::Config {
                message: "a fork organisation is required (use --fork-org)".to_owned(),
            });
        }
        source
            .with_owner(organisation)
            .map_err(|failure| ReproductionError::Config {
                message: failure.to_string(),
            })
    }

    /// Loads the pull request or settles the commit to reproduce. Without a
    /// commit the fork's default branch is read, so the fork is found or
    /// created here rather than in step 4.
    async fn resolve_source(
        &self,
        source: &ReproductionSource,
        fork: &RepositoryLocator,
        run: &mut Run<'_>,
    ) -> Result<ResolvedSource, ReproductionError> {
        match source {
            ReproductionSource::PullRequest(locator) => {
                let snapshot = PullRequestIntake::new(self.pulls.as_ref())
                    .load(locator)
                    .await
                    .map_err(ReproductionError::from_github)?;
                Ok(ResolvedSource::PullRequest {
                    locator: locator.clone(),
                    snapshot: Box::new(snapshot),
                })
            }
            ReproductionSource::Repository {
                repository,
                commit: Some(sha),
            } => Ok(ResolvedSource::Commit {
                repository: repository.clone(),
                sha: sha.as_str().to_owned(),
            }),
            ReproductionSource::Repository {
                repository,
                commit: None,
            } => {
                let fork_url = self.ensure_fork(repository, fork, run).await?;
                run.fork_url = Some(fork_url);
                let sha = self.default_branch_tip(fork).await?;
                Ok(ResolvedSource::Commit {
                    repository: repository.clone(),
                    sha,
                })
            }
        }
    }

    async fn default_branch_tip(
        &self,
        fork: &RepositoryLocator,
    ) -> Result<String, ReproductionError> {
        for branch in DEFAULT_BRANCHES {
            match self.repos.branch_head(fork, branch).await {
                Ok(Some(sha)) => {
                    debug!(fork = %fork, branch, sha, "resolved default branch tip");
                    return Ok(sha);
                }
                Ok(None) => debug!(fork = %fork, branch, "branch does not exist"),
                Err(failure) => return Err(ReproductionError::from_github(failure)),
            }
        }
        Err(ReproductionError::NotFound {
            resource: format!("branch main or master on {fork}"),
        })
    }

    async fn select_strategy(
        &self,
        repository: &RepositoryLocator,
        resolved: &ResolvedSource,
    ) -> Result<ReproductionPlan, ReproductionError> {
        let selector = StrategySelector::new(self.pulls.as_ref());
        match resolved {
            ResolvedSource::PullRequest { snapshot, .. } => {
                let strategy = selector.select_for_pull_request(repository, snapshot).await?;
                Ok(ReproductionPlan {
                    strategy,
                    pull_request: Some(snapshot.as_ref().clone()),
                    commit: None,
                })
            }
            ResolvedSource::Commit { sha, .. } => selector.resolve_commit(repository, sha).await,
        }
    }

    async fn ensure_fork(
        &self,
        source: &RepositoryLocator,
        fork: &RepositoryLocator,
        run: &Run<'_>,
    ) -> Result<String, ReproductionError> {
        let source_key = source.key();
        let fork_key = fork.key();

        let lookup_key = source_key.clone();
        let known = self
            .ledger_call("fork_for", move |ledger: &dyn ReproductionLedger| {
                ledger.fork_for(&lookup_key)
            })
            .await
            .flatten();
        if let Some(record) = known.filter(|record| record.fork == fork_key) {
            debug!(fork = %fork_key, "fork known from ledger");
            return Ok(record.fork_url);
        }

        let info = match self.repos.repository(fork).await {
            Ok(info) => info,
            Err(IntakeError::NotFound { .. }) => {
                info!(source = %source_key, organisation = fork.owner().as_str(), "creating fork");
                run.channel
                    .info(PipelineStep::CheckFork, format!("forking {source_key}"));
                self.repos
                    .create_fork(source, fork.owner().as_str())
                    .await
                    .map_err(ReproductionError::from_github)?;
                self.wait_for_fork(fork, run).await?
            }
            Err(failure) => return Err(ReproductionError::from_github(failure)),
        };

        let record = ForkRecord {
            source: source_key,
            fork: fork_key,
            fork_url: info.html_url.clone(),
        };
        self.ledger_call("record_fork", move |ledger: &dyn ReproductionLedger| {
            ledger.record_fork(&record)
        })
        .await;
        Ok(info.html_url)
    }

    async fn wait_for_fork(
        &self,
        fork: &RepositoryLocator,
        run: &Run<'_>,
    ) -> Result<RepositoryInfo, ReproductionError> {
        let attempts = self.settings.fork_poll_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.settings.fork_poll_interval).await;
            match self.repos.repository(fork).await {
                Ok(info) => return Ok(info),
                Err(IntakeError::NotFound { .. }) => {
                    debug!(fork = %fork, attempt, "fork not reachable yet");
                    run.channel.progress(
                        PipelineStep::CheckFork,
                        format!("waiting for fork ({attempt}/{attempts})"),
                    );
                }
                Err(failure) => return Err(ReproductionError::from_github(failure)),
            }
        }
        Err(ReproductionError::NotFound {
            resource: format!("fork {fork} (not reachable after {attempts} attempts)"),
        })
    }

    /// Refreshes the reference mirror when the cache admits the repository
    /// and returns whatever mirror is usable. Repositories the cache does not
    /// admit never borrow objects, since their mirror may be mid-clone for
    /// another request. Cache failures only cost speed, so they are logged
    /// and the clone proceeds with the last settled mirror, if any.
    async fn reference_mirror(
        &self,
        repository: &RepositoryLocator,
        remote: &RemoteUrl,
        requested: bool,
        run: &Run<'_>,
    ) -> Option<Utf8PathBuf> {
        let cache = self.cache.as_ref()?;
        let report = |update: CloneProgress| {
            run.channel
                .progress(PipelineStep::Clone, format!("reference mirror {update}"));
        };

        match cache.ensure(repository, remote, requested, &report).await {
            Ok(Some(entry)) => Some(entry.path),
            Ok(None) => None,
            Err(failure) => {
                warn!(repo = %repository, error = %failure, "reference mirror unavailable");
                cache.settled_mirror(repository).await
            }
        }
    }

    /// Runs `call` against the ledger on a blocking thread. Returns `None`
    /// when no ledger is configured or the call failed; failures are logged.
    async fn ledger_call<T, F>(&self, action: &'static str, call: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ReproductionLedger) -> Result<T, PersistenceError> + Send + 'static,
    {
        let ledger = Arc::clone(self.ledger.as_ref()?);
        match tokio::task::spawn_blocking(move || call(ledger.as_ref())).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(failure)) => {
                warn!(action, error = %failure, "ledger call failed");
                None
            }
            Err(failure) => {
                warn!(action, error = %failure, "ledger task failed");
                None
            }
        }
    }
}

/// Source after step 2: a loaded pull request or a concrete commit.
#[derive(Debug)]
enum ResolvedSource {
    PullRequest {
        locator: PullRequestLocator,
        snapshot: Box<PullRequestSnapshot>,
    },
    Commit {
        repository: RepositoryLocator,
        sha: String,
    },
}

impl ResolvedSource {
    fn describe(&self) -> String {
        match self {
            Self::PullRequest { snapshot, .. } => {
                format!("pull request #{}: {}", snapshot.number, snapshot.title)
            }
            Self::Commit { sha, .. } => format!("commit {}", short_sha(sha)),
        }
    }

    fn branches(&self) -> BranchPair {
        match self {
            Self::PullRequest { locator, .. } => BranchPair::for_pull_request(locator.number().get()),
            Self::Commit { sha, .. } => BranchPair::for_commit(&short_sha(sha)),
        }
    }

    fn source_ref(&self) -> String {
        match self {
            Self::PullRequest { locator, .. } => {
                format!("{}#{}", locator.repository(), locator.number())
            }
            Self::Commit { repository, sha } => {
                format!("{repository}@{}", short_sha(sha))
            }
        }
    }

    fn source_url(&self, base: &RemoteBase) -> String {
        let link = match self {
            Self::PullRequest { locator, snapshot } => snapshot.html_url.clone().or_else(|| {
                base.web_url(locator.repository(), &format!("pull/{}", locator.number()))
            }),
            Self::Commit { repository, sha } => base.web_url(repository, &format!("commit/{sha}")),
        };
        link.unwrap_or_else(|| self.source_ref())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
