//! Task runner contract
//!
//! The orchestrator never runs tools itself. It submits a `StageTask`, gets a
//! `StageHandle` back at once and probes it with bounded polls until it
//! resolves.

use async_trait::async_trait;
use seqflow_core::{PollResult, StageFailure, StageHandle, StageOutput};
use std::time::Duration;

use crate::task::StageTask;

/// Poll timeout used by `run_sync`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Remote execution substrate for stage tasks
///
/// Handles are independent: cancelling or polling one never affects another.
/// A handle is forgotten by the runner once a terminal result has been
/// returned for it or it has been cancelled.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Enqueues a task and returns without waiting for it to start
    async fn submit(&self, task: StageTask) -> Result<StageHandle, StageFailure>;

    /// Waits up to `timeout` for the task to resolve
    ///
    /// Returns `PollResult::Pending` when the deadline passes first.
    async fn poll(&self, handle: &StageHandle, timeout: Duration) -> PollResult;

    /// Requests cancellation; best-effort and idempotent
    async fn cancel(&self, handle: &StageHandle);

    /// Poll timeout used by `run_sync`
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Submits a task and polls it until it resolves
    async fn run_sync(&self, task: StageTask) -> Result<StageOutput, StageFailure> {
        let handle = self.submit(task).await?;

        loop {
            match self.poll(&handle, self.poll_interval()).await {
                PollResult::Pending => continue,
                PollResult::Done(output) => return Ok(output),
                PollResult::Failed(failure) => return Err(failure),
            }
        }
    }
}
