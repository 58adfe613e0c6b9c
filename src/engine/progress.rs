//! Ordered, step-numbered progress reporting.
//!
//! A [`ProgressChannel`] is handed to every component that reports status.
//! It carries structured `(kind, step, message)` events and is terminated by
//! exactly one [`ReproductionResult`]; anything sent after the result is
//! discarded. Rendering is left to the consumer, which receives
//! [`ProgressUpdate`]s through a [`ProgressReceiver`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;

/// Category of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// Neutral status.
    Info,
    /// A step completed.
    Success,
    /// A step failed.
    Error,
    /// Incremental progress within a step.
    Progress,
}

/// The fixed ten-step reproduction plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Check credentials and inputs.
    ValidateConfig,
    /// Load the source pull request or commit.
    ResolveSource,
    /// Gather what the strategy ladder needs.
    FetchStrategyInputs,
    /// Find or create the fork.
    CheckFork,
    /// Adjust fork settings such as Actions.
    VerifyForkConfig,
    /// Materialise the working clone.
    Clone,
    /// Fetch the commits to reproduce.
    FetchCommits,
    /// Create the base and review branches.
    BuildBranches,
    /// Replay commits onto the review branch.
    ApplyCommits,
    /// Push branches and open the pull request.
    Publish,
}

impl PipelineStep {
    /// Number of steps in the plan.
    pub const TOTAL: u8 = 10;

    /// 1-based position of the step.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::ValidateConfig => 1,
            Self::ResolveSource => 2,
            Self::FetchStrategyInputs => 3,
            Self::CheckFork => 4,
            Self::VerifyForkConfig => 5,
            Self::Clone => 6,
            Self::FetchCommits => 7,
            Self::BuildBranches => 8,
            Self::ApplyCommits => 9,
            Self::Publish => 10,
        }
    }
}

/// A single progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Event category.
    pub kind: ProgressKind,
    /// 1-based step number, when the event belongs to a step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
    /// Number of steps in the plan, present whenever `step` is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u8>,
    /// Status text.
    pub message: String,
}

/// Terminal payload of a reproduction request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReproductionResult {
    /// Whether the review pull request exists.
    pub success: bool,
    /// URL of the review pull request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// URL of the fork.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_url: Option<String>,
    /// Number of commits reproduced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_count: Option<usize>,
    /// True when an existing pull request was reused.
    pub reused: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReproductionResult {
    /// Builds a failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Item delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressUpdate {
    /// Intermediate event.
    Event(ProgressEvent),
    /// Terminal result; nothing follows it.
    Result(ReproductionResult),
}

/// Sending half, cheap to clone and shared by every component of a request.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: UnboundedSender<ProgressUpdate>,
    finished: Arc<AtomicBool>,
}

/// Creates a connected channel and receiver.
#[must_use]
pub fn progress_channel() -> (ProgressChannel, ProgressReceiver) {
    let (sender, receiver) = unbounded_channel();
    (
        ProgressChannel {
            sender,
            finished: Arc::new(AtomicBool::new(false)),
        },
        ProgressReceiver { receiver },
    )
}

impl ProgressChannel {
    /// Emits an event unless the channel has already finished.
    pub fn emit(
        &self,
        kind: ProgressKind,
        step: Option<PipelineStep>,
        message: impl Into<String>,
    ) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        let event = ProgressEvent {
            kind,
            step: step.map(PipelineStep::number),
            total_steps: step.map(|_| PipelineStep::TOTAL),
            message: message.into(),
        };
        if self.sender.send(ProgressUpdate::Event(event)).is_err() {
            trace!("progress receiver closed; event dropped");
        }
    }

    /// Emits an `info` event for `step`.
    pub fn info(&self, step: PipelineStep, message: impl Into<String>) {
        self.emit(ProgressKind::Info, Some(step), message);
    }

    /// Emits a `success` event for `step`.
    pub fn success(&self, step: PipelineStep, message: impl Into<String>) {
        self.emit(ProgressKind::Success, Some(step), message);
    }

    /// Emits an `error` event for `step`.
    pub fn error(&self, step: PipelineStep, message: impl Into<String>) {
        self.emit(ProgressKind::Error, Some(step), message);
    }

    /// Emits a `progress` event for `step`.
    pub fn progress(&self, step: PipelineStep, message: impl Into<String>) {
        self.emit(ProgressKind::Progress, Some(step), message);
    }

    /// Sends the terminal result. Returns false when a result was already
    /// sent, in which case `result` is dropped.
    pub fn finish(&self, result: ReproductionResult) -> bool {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if self.sender.send(ProgressUpdate::Result(result)).is_err() {
            trace!("progress receiver closed; result dropped");
        }
        true
    }

    /// Returns true once the terminal result has been sent.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Returns true when the consumer has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half held by the caller.
#[derive(Debug)]
pub struct ProgressReceiver {
    receiver: UnboundedReceiver<ProgressUpdate>,
}

impl ProgressReceiver {
    /// Waits for the next update; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ProgressUpdate> {
        self.receiver.recv().await
    }

    /// Drains events until the terminal result arrives.
    pub async fn collect_until_finished(
        mut self,
    ) -> (Vec<ProgressEvent>, Option<ReproductionResult>) {
        let mut events = Vec::new();
        while let Some(update) = self.receiver.recv().await {
            match update {
                ProgressUpdate::Event(event) => events.push(event),
                ProgressUpdate::Result(result) => return (events, Some(result)),
            }
        }
        (events, None)
    }
}
