//! Join over outstanding stage handles
//!
//! All unresolved handles are polled concurrently, each poll bounded by the
//! poll interval, until every handle has resolved. The join completes only
//! when all members have resolved, regardless of resolution order.
//!
//! A failure the caller marks fatal ends the join early: the handles still
//! outstanding are cancelled and reported as such. The join as a whole is
//! bounded by a deadline; handles outstanding at the deadline are cancelled
//! and fail as timed out.

use futures::future::join_all;
use seqflow_core::{FailureKind, PollResult, StageFailure, StageHandle, StageName, StageOutput};
use seqflow_runner::TaskRunner;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Terminal result of one joined handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Done(StageOutput),
    Failed(StageFailure),
    Cancelled,
}

/// What the join observed, in resolution order
#[derive(Debug, Clone, Default)]
pub struct JoinReport {
    pub resolved: Vec<(StageHandle, Resolution)>,
    /// First failure the caller classified as fatal
    pub fatal: Option<StageFailure>,
}

impl JoinReport {
    /// Failures that did not stop the join
    pub fn tolerated_failures(&self) -> impl Iterator<Item = &StageFailure> {
        self.resolved.iter().filter_map(|(_, resolution)| match resolution {
            Resolution::Failed(failure) if Some(failure) != self.fatal.as_ref() => Some(failure),
            _ => None,
        })
    }
}

/// Timing of a join
#[derive(Debug, Clone, Copy)]
pub struct JoinTiming {
    /// Per-poll timeout
    pub poll_interval: Duration,
    /// Deadline for the whole join
    pub timeout: Duration,
}

/// Waits for every handle to resolve
///
/// # Arguments
/// * `runner` - Runner that issued the handles
/// * `handles` - Outstanding handles; consumed by the join
/// * `timing` - Poll interval and overall deadline
/// * `is_fatal` - Whether a failure of the given stage stops the join
pub async fn join_handles(
    runner: &dyn TaskRunner,
    handles: Vec<StageHandle>,
    timing: JoinTiming,
    is_fatal: impl Fn(StageName) -> bool,
) -> JoinReport {
    let deadline = Instant::now() + timing.timeout;
    let mut report = JoinReport::default();
    let mut pending = handles;

    while !pending.is_empty() {
        let now = Instant::now();
        if now >= deadline {
            warn!(
                "Join deadline of {:?} passed with {} stage(s) outstanding",
                timing.timeout,
                pending.len()
            );
            cancel_all(runner, &pending).await;
            for handle in pending.drain(..) {
                let failure = StageFailure::new(
                    handle.stage,
                    FailureKind::TimedOut,
                    format!("unresolved after {:?}", timing.timeout),
                );
                if report.fatal.is_none() && is_fatal(handle.stage) {
                    report.fatal = Some(failure.clone());
                }
                report.resolved.push((handle, Resolution::Failed(failure)));
            }
            break;
        }

        let wait = timing.poll_interval.min(deadline - now);
        let results = join_all(pending.iter().map(|handle| runner.poll(handle, wait))).await;

        let mut still_pending = Vec::new();
        for (handle, result) in pending.into_iter().zip(results) {
            match result {
                PollResult::Pending => still_pending.push(handle),
                PollResult::Done(output) => {
                    debug!("{} resolved", handle);
                    report.resolved.push((handle, Resolution::Done(output)));
                }
                PollResult::Failed(failure) => {
                    debug!("{} failed: {}", handle, failure);
                    if report.fatal.is_none() && is_fatal(handle.stage) {
                        report.fatal = Some(failure.clone());
                    }
                    report.resolved.push((handle, Resolution::Failed(failure)));
                }
            }
        }
        pending = still_pending;

        if report.fatal.is_some() && !pending.is_empty() {
            cancel_all(runner, &pending).await;
            for handle in pending.drain(..) {
                report.resolved.push((handle, Resolution::Cancelled));
            }
        }
    }

    report
}

/// Issues cancellation for every handle; the cancelled work is not waited on
async fn cancel_all(runner: &dyn TaskRunner, handles: &[StageHandle]) {
    for handle in handles {
        warn!("Cancelling outstanding {}", handle);
    }
    join_all(handles.iter().map(|handle| runner.cancel(handle))).await;
}
