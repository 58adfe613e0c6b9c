//! The reproduction engine.
//!
//! A request flows through [`ReproductionEngine`]: the [`StrategySelector`]
//! decides how to rebuild the change, the [`WorkingCloneManager`] makes a
//! private clone (borrowing objects from the [`ReferenceRepoCache`] when it
//! can), the [`CherryPickEngine`] builds the base and review branches, and
//! the [`PullRequestPublisher`] pushes them and opens or reuses the review
//! pull request. Every step reports through a [`ProgressChannel`].

pub mod cache;
pub mod cherry_pick;
pub mod clone;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod render;
pub mod retry;
pub mod strategy;

pub use cache::{AllowListPolicy, CacheEntry, CachePolicy, CloneProgress, ReferenceRepoCache};
pub use cherry_pick::{BranchPair, CherryPickEngine};
pub use clone::{WorkingClone, WorkingCloneManager};
pub use error::ReproductionError;
pub use lock::{RepoLockGuard, RepoLockManager};
pub use pipeline::{EngineSettings, ReproductionEngine, ReproductionRequest, ReproductionSource};
pub use progress::{
    PipelineStep, ProgressChannel, ProgressEvent, ProgressKind, ProgressReceiver, ProgressUpdate,
    ReproductionResult, progress_channel,
};
pub use publish::{PublishBase, PublishMetadata, PublishOutcome, PullRequestPublisher};
pub use retry::FetchRetryPolicy;
pub use strategy::{ReproductionPlan, ReproductionStrategy, StrategySelector};
