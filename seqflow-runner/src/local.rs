//! Local worker pool
//!
//! Each submitted task runs in its own tokio task, gated by a semaphore so at
//! most `max_parallel_tasks` execute at once. A task's result is published
//! through a `watch` channel that `poll` waits on with a deadline.

use async_trait::async_trait;
use seqflow_core::{
    FailureKind, PollResult, StageFailure, StageHandle, StageName, StageOutput,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::executor::StageExecutor;
use crate::retry::RetryPolicy;
use crate::runner::{DEFAULT_POLL_INTERVAL, TaskRunner};
use crate::task::StageTask;

type TaskResult = Result<StageOutput, StageFailure>;

struct Entry {
    stage: StageName,
    result: watch::Receiver<Option<TaskResult>>,
    abort: AbortHandle,
}

/// Task runner executing stages in-process
pub struct LocalTaskRunner {
    executor: Arc<dyn StageExecutor>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    task_timeout: Duration,
    poll_interval: Duration,
    tasks: Mutex<HashMap<Uuid, Entry>>,
}

impl LocalTaskRunner {
    /// Creates a new runner
    ///
    /// # Arguments
    /// * `executor` - Executes the submitted tasks
    /// * `config` - Pool size, task timeout and retry policy
    pub fn new(executor: Arc<dyn StageExecutor>, config: &Config) -> Self {
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(config.max_parallel_tasks)),
            retry: config.retry,
            task_timeout: config.task_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the poll timeout used by `run_sync`
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Number of handles the runner is still tracking
    pub fn tracked(&self) -> usize {
        self.lock_tasks().len()
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        // A panic while holding the lock leaves the map itself intact
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn execute(
        executor: Arc<dyn StageExecutor>,
        task: StageTask,
        retry: RetryPolicy,
        task_timeout: Duration,
    ) -> TaskResult {
        let stage = task.stage();
        let label = task.to_string();

        let attempts = retry.run(
            &label,
            || executor.execute(&task),
            |failure: &StageFailure| failure.kind == FailureKind::Transient,
        );

        match tokio::time::timeout(task_timeout, attempts).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err((failure, attempts))) if failure.kind == FailureKind::Transient => {
                Err(StageFailure::new(
                    stage,
                    FailureKind::Transient,
                    format!("gave up after {} attempt(s): {}", attempts, failure.message),
                ))
            }
            Ok(Err((failure, _))) => Err(failure),
            Err(_) => Err(StageFailure::new(
                stage,
                FailureKind::TimedOut,
                format!("exceeded task timeout of {:?}", task_timeout),
            )),
        }
    }
}

#[async_trait]
impl TaskRunner for LocalTaskRunner {
    async fn submit(&self, task: StageTask) -> Result<StageHandle, StageFailure> {
        let handle = StageHandle::new(task.stage(), task.pipeline_id().clone());
        let (tx, rx) = watch::channel(None);

        let executor = Arc::clone(&self.executor);
        let semaphore = Arc::clone(&self.semaphore);
        let retry = self.retry;
        let task_timeout = self.task_timeout;
        let id = handle.to_string();

        let join = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                let _ = tx.send(Some(Err(StageFailure::new(
                    task.stage(),
                    FailureKind::Internal,
                    "worker pool closed",
                ))));
                return;
            };

            debug!("Starting {}", id);
            let result = Self::execute(executor, task, retry, task_timeout).await;

            match &result {
                Ok(output) => info!("{} completed in {:?}", id, output.elapsed),
                Err(failure) => error!("{} failed: {}", id, failure),
            }

            let _ = tx.send(Some(result));
            // Permit is released when dropped
        });

        self.lock_tasks().insert(
            handle.id,
            Entry {
                stage: handle.stage,
                result: rx,
                abort: join.abort_handle(),
            },
        );

        debug!("Submitted {}", handle);
        Ok(handle)
    }

    async fn poll(&self, handle: &StageHandle, timeout: Duration) -> PollResult {
        let Some((mut rx, stage)) = self
            .lock_tasks()
            .get(&handle.id)
            .map(|entry| (entry.result.clone(), entry.stage))
        else {
            return PollResult::Failed(StageFailure::new(
                handle.stage,
                FailureKind::Internal,
                format!("unknown handle {}", handle),
            ));
        };

        let resolved = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Err(_) => return PollResult::Pending,
            Ok(Ok(state)) => (*state).clone(),
            // The sender is gone without a result: the task was aborted or panicked
            Ok(Err(_)) => None,
        };

        // Only `cancel` removes an entry while a poll is waiting on it
        let cancelled = self.lock_tasks().remove(&handle.id).is_none();

        match resolved {
            Some(Ok(output)) => PollResult::Done(output),
            Some(Err(failure)) => PollResult::Failed(failure),
            None if cancelled => PollResult::Failed(StageFailure::cancelled(stage)),
            None => PollResult::Failed(StageFailure::new(
                stage,
                FailureKind::Internal,
                "task ended without a result",
            )),
        }
    }

    async fn cancel(&self, handle: &StageHandle) {
        let Some(entry) = self.lock_tasks().remove(&handle.id) else {
            return;
        };

        if entry.result.borrow().is_none() {
            warn!("Cancelling {}", handle);
            entry.abort.abort();
        }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqflow_core::SampleSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executor that sleeps, then fails transiently a fixed number of times
    struct ScriptedExecutor {
        delay: Duration,
        transient_failures: usize,
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
        tool_failure: bool,
    }

    impl ScriptedExecutor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                transient_failures: 0,
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                tool_failure: false,
            }
        }
    }

    #[async_trait]
    impl StageExecutor for ScriptedExecutor {
        async fn execute(&self, task: &StageTask) -> Result<StageOutput, StageFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if call < self.transient_failures {
                return Err(StageFailure::new(
                    task.stage(),
                    FailureKind::Transient,
                    "connection reset",
                ));
            }
            if self.tool_failure {
                return Err(StageFailure::new(task.stage(), FailureKind::Tool, "exit 1"));
            }

            Ok(StageOutput {
                stage: task.stage(),
                diagnostics: String::new(),
                elapsed: self.delay,
            })
        }
    }

    fn config(max_parallel_tasks: usize) -> Config {
        let mut config = Config::default();
        config.max_parallel_tasks = max_parallel_tasks;
        config.retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        config
    }

    fn task() -> StageTask {
        let sample = SampleSpec::new("S1", vec!["S1.fastq.gz".to_string()]).unwrap();
        StageTask::trimming(&sample)
    }

    #[tokio::test]
    async fn test_poll_returns_pending_then_done() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_millis(200)));
        let runner = LocalTaskRunner::new(executor, &config(2));

        let handle = runner.submit(task()).await.unwrap();
        assert!(matches!(
            runner.poll(&handle, Duration::from_millis(10)).await,
            PollResult::Pending
        ));

        let result = runner.poll(&handle, Duration::from_secs(5)).await;
        assert!(matches!(result, PollResult::Done(ref o) if o.stage == StageName::Trimming));
        assert_eq!(runner.tracked(), 0);
    }

    #[tokio::test]
    async fn test_handle_is_forgotten_after_terminal_poll() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::ZERO));
        let runner = LocalTaskRunner::new(executor, &config(1));

        let handle = runner.submit(task()).await.unwrap();
        assert!(runner.poll(&handle, Duration::from_secs(5)).await.is_terminal());

        let again = runner.poll(&handle, Duration::from_millis(10)).await;
        assert!(matches!(again, PollResult::Failed(ref f) if f.kind == FailureKind::Internal));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_forgets_handle() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_secs(60)));
        let runner = LocalTaskRunner::new(executor, &config(1));

        let handle = runner.submit(task()).await.unwrap();
        runner.cancel(&handle).await;
        runner.cancel(&handle).await;
        assert_eq!(runner.tracked(), 0);

        let result = runner.poll(&handle, Duration::from_millis(10)).await;
        assert!(matches!(result, PollResult::Failed(ref f) if f.kind == FailureKind::Internal));
    }

    #[tokio::test]
    async fn test_cancelled_handles_are_not_tracked() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_secs(60)));
        let runner = LocalTaskRunner::new(executor, &config(5));

        let mut handles = Vec::new();
        for _ in 0..5 {
            handles.push(runner.submit(task()).await.unwrap());
        }
        for handle in &handles {
            runner.cancel(handle).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(runner.tracked(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_poll_reports_cancelled() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_secs(60)));
        let runner = Arc::new(LocalTaskRunner::new(executor, &config(1)));

        let handle = runner.submit(task()).await.unwrap();
        let poll = {
            let runner = runner.clone();
            let handle = handle.clone();
            tokio::spawn(async move { runner.poll(&handle, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.cancel(&handle).await;

        let result = poll.await.unwrap();
        assert!(matches!(result, PollResult::Failed(ref f) if f.kind == FailureKind::Cancelled));
        assert_eq!(runner.tracked(), 0);
    }

    #[tokio::test]
    async fn test_cancel_does_not_affect_other_handles() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_millis(50)));
        let runner = LocalTaskRunner::new(executor, &config(2));

        let first = runner.submit(task()).await.unwrap();
        let second = runner.submit(task()).await.unwrap();
        runner.cancel(&first).await;

        assert!(matches!(
            runner.poll(&second, Duration::from_secs(5)).await,
            PollResult::Done(_)
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut scripted = ScriptedExecutor::new(Duration::ZERO);
        scripted.transient_failures = 2;
        let executor = Arc::new(scripted);
        let runner = LocalTaskRunner::new(executor.clone(), &config(1));

        let output = runner.run_sync(task()).await.unwrap();
        assert_eq!(output.stage, StageName::Trimming);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_escalate_after_budget() {
        let mut scripted = ScriptedExecutor::new(Duration::ZERO);
        scripted.transient_failures = 10;
        let executor = Arc::new(scripted);
        let runner = LocalTaskRunner::new(executor.clone(), &config(1));

        let failure = runner.run_sync(task()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(failure.message.contains("gave up after 3 attempt(s)"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_tool_failures_are_not_retried() {
        let mut scripted = ScriptedExecutor::new(Duration::ZERO);
        scripted.tool_failure = true;
        let executor = Arc::new(scripted);
        let runner = LocalTaskRunner::new(executor.clone(), &config(1));

        let failure = runner.run_sync(task()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Tool);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_task_timeout() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_secs(60)));
        let mut config = config(1);
        config.task_timeout = Duration::from_millis(20);
        let runner = LocalTaskRunner::new(executor, &config);

        let failure = runner.run_sync(task()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::TimedOut);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_millis(30)));
        let runner = LocalTaskRunner::new(executor.clone(), &config(2));

        let mut handles = Vec::new();
        for _ in 0..6 {
            handles.push(runner.submit(task()).await.unwrap());
        }
        for handle in &handles {
            assert!(matches!(
                runner.poll(handle, Duration::from_secs(5)).await,
                PollResult::Done(_)
            ));
        }

        assert_eq!(executor.calls.load(Ordering::SeqCst), 6);
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
    }
}
