//! Application configuration loaded from CLI, environment, and files.
//!
//! [`ReproConfig`] merges values from command-line arguments, environment
//! variables, and configuration files using ortho-config's layered
//! approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.reprise.toml` in the current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `REPRISE_PR_URL`, `REPRISE_TOKEN`, or
//!    `GITHUB_TOKEN` for the token
//! 4. **Command-line arguments** – `--pr-url`/`-u`, `--repo-url`/`-r`, and so
//!    on
//!
//! # Configuration File
//!
//! ```toml
//! fork_org = "acme-review"
//! token = "ghp_example"
//! cacheable_repos = ["rust-lang/rust", "torvalds/linux"]
//! cache_root = "/var/cache/reprise/repos"
//! database_url = "reprise.sqlite"
//! ```

use std::env;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineSettings, ReproductionError, ReproductionRequest, ReproductionSource};
use crate::github::{
    CommitSha, IntakeError, PersonalAccessToken, PullRequestLocator, RepositoryLocator,
};
use crate::local::RemoteBase;

/// Host used for git remotes when none is configured.
pub const DEFAULT_GIT_HOST: &str = "https://github.com";

const DEFAULT_FORK_POLL_ATTEMPTS: u32 = 10;
const DEFAULT_FORK_POLL_INTERVAL_SECONDS: u64 = 2;
const FALLBACK_CACHE_DIR: &str = ".reprise-cache";

/// Application configuration supporting CLI, environment, and file sources.
///
/// Exactly one of `pr_url` and `repo_url` selects the source; `commit` pins
/// a repository source to a specific commit.
///
/// # Example
///
/// ```no_run
/// use ortho_config::OrthoConfig;
/// use reprise::ReproConfig;
///
/// let config = ReproConfig::load().expect("failed to load configuration");
/// let request = config.request().expect("valid request");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "REPRISE",
    discovery(
        dotfile_name = ".reprise.toml",
        config_file_name = "reprise.toml",
        app_name = "reprise"
    )
)]
pub struct ReproConfig {
    /// Pull request to reproduce.
    ///
    /// Can be provided via:
    /// - CLI: `--pr-url <URL>` or `-u <URL>`
    /// - Environment: `REPRISE_PR_URL`
    /// - Config file: `pr_url = "..."`
    #[ortho_config(cli_short = 'u')]
    pub pr_url: Option<String>,

    /// Repository whose commit (or default branch tip) is reproduced.
    ///
    /// Can be provided via:
    /// - CLI: `--repo-url <URL>` or `-r <URL>`
    /// - Environment: `REPRISE_REPO_URL`
    #[ortho_config(cli_short = 'r')]
    pub repo_url: Option<String>,

    /// Commit SHA to reproduce from `repo_url`.
    #[ortho_config(cli_short = 'c')]
    pub commit: Option<String>,

    /// Mirror the source repository for this run even when it is not on
    /// the cacheable list.
    ///
    /// Environment variable `REPRISE_CACHE_REPO` is not supported because
    /// `ortho_config` does not load boolean values from the environment.
    #[ortho_config()]
    pub cache_repo: bool,

    /// Personal access token for the GitHub API and git remotes.
    ///
    /// Can be provided via:
    /// - CLI: `--token <TOKEN>` or `-t <TOKEN>`
    /// - Environment: `REPRISE_TOKEN` or `GITHUB_TOKEN`
    /// - Config file: `token = "..."`
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// Organisation that owns the review forks.
    #[ortho_config(cli_short = 'o')]
    pub fork_org: Option<String>,

    /// Root of the reference repository cache.
    ///
    /// Defaults to `$XDG_CACHE_HOME/reprise/repos`, or `.reprise-cache` when
    /// `XDG_CACHE_HOME` is unset.
    #[ortho_config()]
    pub cache_root: Option<String>,

    /// `owner/name` keys of repositories that may be mirrored.
    #[ortho_config()]
    pub cacheable_repos: Vec<String>,

    /// Base under which `<owner>/<name>.git` remotes live. Either an HTTP(S)
    /// host or a local directory of bare repositories.
    #[ortho_config()]
    pub git_host: String,

    /// Local `SQLite` database URL/path for the reproduction ledger.
    ///
    /// Can be provided via:
    /// - CLI: `--database-url <PATH>`
    /// - Environment: `REPRISE_DATABASE_URL`
    /// - Config file: `database_url = "..."`
    #[ortho_config()]
    pub database_url: Option<String>,

    /// Runs database migrations and exits.
    ///
    /// When set, reprise applies any pending Diesel migrations to
    /// `database_url`, records the schema version in telemetry, and exits
    /// without touching GitHub.
    #[ortho_config()]
    pub migrate_db: bool,

    /// How many times to poll for a freshly created fork.
    #[ortho_config()]
    pub fork_poll_attempts: u32,

    /// Seconds between fork polls.
    #[ortho_config()]
    pub fork_poll_interval_seconds: u64,
}

impl Default for ReproConfig {
    fn default() -> Self {
        Self {
            pr_url: None,
            repo_url: None,
            commit: None,
            cache_repo: false,
            token: None,
            fork_org: None,
            cache_root: None,
            cacheable_repos: Vec::new(),
            git_host: DEFAULT_GIT_HOST.to_owned(),
            database_url: None,
            migrate_db: false,
            fork_poll_attempts: DEFAULT_FORK_POLL_ATTEMPTS,
            fork_poll_interval_seconds: DEFAULT_FORK_POLL_INTERVAL_SECONDS,
        }
    }
}

impl ReproConfig {
    /// Resolves the token from configuration or the `GITHUB_TOKEN`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::MissingToken`] when no source provides a
    /// non-blank value.
    pub fn resolve_token(&self) -> Result<PersonalAccessToken, IntakeError> {
        let raw = self
            .token
            .clone()
            .or_else(|| env::var("GITHUB_TOKEN").ok())
            .ok_or(IntakeError::MissingToken)?;
        PersonalAccessToken::new(raw)
    }

    /// Checks that the source options are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::Config`] when neither or both of
    /// `pr_url` and `repo_url` are set, or when `commit` accompanies a pull
    /// request URL.
    pub fn validate(&self) -> Result<(), ReproductionError> {
        match (&self.pr_url, &self.repo_url) {
            (None, None) => Err(config_error(
                "a source is required (use --pr-url or --repo-url)",
            )),
            (Some(_), Some(_)) => Err(config_error(
                "--pr-url and --repo-url cannot be combined",
            )),
            (Some(_), None) if self.commit.is_some() => Err(config_error(
                "--commit requires --repo-url",
            )),
            _ => Ok(()),
        }
    }

    /// Builds the request described by the source options.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::Config`] when validation fails or a URL
    /// or commit SHA cannot be parsed.
    pub fn request(&self) -> Result<ReproductionRequest, ReproductionError> {
        self.validate()?;

        let source = if let Some(pr_url) = &self.pr_url {
            ReproductionSource::PullRequest(
                PullRequestLocator::parse(pr_url).map_err(invalid_option("--pr-url"))?,
            )
        } else {
            let repo_url = self.repo_url.as_deref().unwrap_or_default();
            let repository =
                RepositoryLocator::parse(repo_url).map_err(invalid_option("--repo-url"))?;
            let commit = self
                .commit
                .as_deref()
                .map(CommitSha::parse)
                .transpose()
                .map_err(invalid_option("--commit"))?;
            ReproductionSource::Repository { repository, commit }
        };

        Ok(ReproductionRequest {
            source,
            cache_repo: self.cache_repo,
        })
    }

    /// Organisation that owns the forks.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::Config`] when it is missing or blank.
    pub fn require_fork_org(&self) -> Result<&str, ReproductionError> {
        self.fork_org
            .as_deref()
            .map(str::trim)
            .filter(|org| !org.is_empty())
            .ok_or_else(|| config_error("fork organisation is required (use --fork-org or -o)"))
    }

    /// Reference cache root, honouring `XDG_CACHE_HOME` when no explicit
    /// root is configured.
    #[must_use]
    pub fn resolve_cache_root(&self) -> Utf8PathBuf {
        if let Some(root) = self.cache_root.as_deref().filter(|root| !root.is_empty()) {
            return Utf8PathBuf::from(root);
        }
        env::var("XDG_CACHE_HOME")
            .ok()
            .filter(|home| !home.is_empty())
            .map_or_else(
                || Utf8PathBuf::from(FALLBACK_CACHE_DIR),
                |home| Utf8PathBuf::from(home).join("reprise").join("repos"),
            )
    }

    /// Parses `git_host`.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::Config`] for unsupported schemes.
    pub fn remote_base(&self) -> Result<RemoteBase, ReproductionError> {
        RemoteBase::parse(self.git_host.trim()).map_err(|error| ReproductionError::Config {
            message: format!("invalid --git-host: {error}"),
        })
    }

    /// Settings for the engine.
    ///
    /// A missing token is left for the engine to report so that it surfaces
    /// as a first-step failure on the progress stream.
    ///
    /// # Errors
    ///
    /// Returns [`ReproductionError::Config`] when the fork organisation is
    /// missing or `git_host` is unusable.
    pub fn engine_settings(&self) -> Result<EngineSettings, ReproductionError> {
        Ok(EngineSettings {
            fork_org: self.require_fork_org()?.to_owned(),
            token: self.resolve_token().ok(),
            remote_base: self.remote_base()?,
            fork_poll_attempts: self.fork_poll_attempts.max(1),
            fork_poll_interval: Duration::from_secs(self.fork_poll_interval_seconds),
        })
    }
}

fn config_error(message: &str) -> ReproductionError {
    ReproductionError::Config {
        message: message.to_owned(),
    }
}

fn invalid_option(option: &'static str) -> impl Fn(IntakeError) -> ReproductionError {
    move |error| ReproductionError::Config {
        message: format!("invalid {option}: {error}"),
    }
}

#[cfg(test)]
mod tests;
