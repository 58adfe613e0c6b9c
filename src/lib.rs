//! Reprise reproduces GitHub pull requests as review branches inside an
//! organisation-owned fork.
//!
//! Given a pull request URL, or a repository URL with an optional commit,
//! the [`ReproductionEngine`] picks a reproduction strategy, clones the fork
//! (borrowing objects from a local reference cache when it can), rebuilds
//! the change as a base branch plus a review branch, and opens or reuses a
//! pull request on the fork. Progress streams through a
//! [`ProgressReceiver`] and always ends with a [`ReproductionResult`].

pub mod config;
pub mod engine;
pub mod github;
pub mod local;
pub mod persistence;
pub mod telemetry;

pub use config::ReproConfig;
pub use engine::{
    EngineSettings, ProgressEvent, ProgressReceiver, ProgressUpdate, ReproductionEngine,
    ReproductionError, ReproductionRequest, ReproductionResult, ReproductionSource,
};
pub use github::{
    CommitSha, IntakeError, OctocrabGateway, PersonalAccessToken, PullRequestLocator,
    RepositoryLocator,
};
pub use persistence::{PersistenceError, ReproductionLedger, SqliteReproductionLedger};
