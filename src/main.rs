//! Reprise CLI entrypoint.
//!
//! Runs one reproduction request and streams its progress to stdout as JSON
//! lines, ending with the result line. Logs go to stderr.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use ortho_config::OrthoConfig;
use reprise::engine::{AllowListPolicy, ReferenceRepoCache, RepoLockManager};
use reprise::github::PullRequestGateway;
use reprise::local::{CommandGitRunner, GitRunner};
use reprise::persistence::migrate_database;
use reprise::telemetry::{StderrJsonlTelemetrySink, TelemetrySink};
use reprise::{
    OctocrabGateway, ProgressUpdate, ReproConfig, ReproductionEngine, ReproductionError,
    ReproductionResult, SqliteReproductionLedger,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reprise=info";

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(run_error) => {
            error!(error = %run_error, "reproduction did not start");
            let update = ProgressUpdate::Result(ReproductionResult::failure(run_error.to_string()));
            if let Err(io_error) = write_update(&update) {
                error!(error = %io_error, "failed to write result");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Returns whether the reproduction succeeded.
async fn run() -> Result<bool, ReproductionError> {
    let config = load_config()?;

    if config.migrate_db {
        return migrate(&config);
    }

    let request = config.request()?;
    let settings = config.engine_settings()?;
    let Some(token) = settings.token.clone() else {
        return Err(ReproductionError::Config {
            message: reprise::IntakeError::MissingToken.to_string(),
        });
    };

    let gateway = Arc::new(
        OctocrabGateway::for_token(&token, request.source.repository().api_base())
            .map_err(ReproductionError::from_github)?,
    );
    let runner: Arc<dyn GitRunner> = Arc::new(CommandGitRunner::default());
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(StderrJsonlTelemetrySink);
    let cache = ReferenceRepoCache::new(
        config.resolve_cache_root(),
        Arc::clone(&runner),
        RepoLockManager::new(),
        Arc::new(AllowListPolicy::new(&config.cacheable_repos)),
        Arc::clone(&telemetry),
    );

    let pulls = Arc::clone(&gateway) as Arc<dyn PullRequestGateway>;
    let mut engine = ReproductionEngine::new(pulls, gateway, runner, settings)
        .with_cache(Arc::new(cache))
        .with_telemetry(telemetry);
    if let Some(database_url) = config.database_url.as_deref() {
        let ledger = SqliteReproductionLedger::new(database_url)
            .map_err(|ledger_error| internal(&ledger_error))?;
        engine = engine.with_ledger(Arc::new(ledger));
    }

    info!(source = %request.source, "starting reproduction");
    let mut receiver = Arc::new(engine).start(request);
    while let Some(update) = receiver.recv().await {
        write_update(&update).map_err(|io_error| internal(&io_error))?;
        if let ProgressUpdate::Result(result) = update {
            return Ok(result.success);
        }
    }

    Err(ReproductionError::Internal {
        message: "progress stream closed without a result".to_owned(),
    })
}

/// Loads configuration from CLI, environment, and files.
fn load_config() -> Result<ReproConfig, ReproductionError> {
    ReproConfig::load().map_err(|load_error| ReproductionError::Config {
        message: load_error.to_string(),
    })
}

fn migrate(config: &ReproConfig) -> Result<bool, ReproductionError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| ReproductionError::Config {
            message: "--migrate-db requires --database-url".to_owned(),
        })?;
    let version = migrate_database(database_url, &StderrJsonlTelemetrySink)
        .map_err(|migration_error| internal(&migration_error))?;
    info!(schema_version = version.as_str(), "ledger database migrated");
    Ok(true)
}

fn write_update(update: &ProgressUpdate) -> io::Result<()> {
    let line = serde_json::to_string(update).map_err(io::Error::other)?;
    writeln!(io::stdout().lock(), "{line}")
}

fn internal(source: &impl ToString) -> ReproductionError {
    ReproductionError::Internal {
        message: source.to_string(),
    }
}
