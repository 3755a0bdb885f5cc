//! Scripted runner for orchestrator tests

use async_trait::async_trait;
use seqflow_core::layout::{LIB_FORMAT_REPORT, QUALITY_REPORT, SIGNAL_FILES};
use seqflow_core::{
    FailureKind, PollResult, StageFailure, StageHandle, StageName, StageOutput, TrimGaloreNaming,
    TrimNaming,
};
use seqflow_runner::{StageTask, TaskRunner};
use seqflow_store::MemoryArtifactStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Succeed,
    /// Reports success without writing any output
    SucceedEmpty,
    Fail,
    Never,
}

/// How a stage behaves once submitted
#[derive(Debug, Clone, Copy)]
pub struct Script {
    polls: usize,
    ending: Ending,
}

impl Script {
    /// Resolves successfully on the `polls`-th poll
    pub fn succeed_after(polls: usize) -> Self {
        Self {
            polls,
            ending: Ending::Succeed,
        }
    }

    pub fn succeed_without_outputs() -> Self {
        Self {
            polls: 1,
            ending: Ending::SucceedEmpty,
        }
    }

    pub fn fail_after(polls: usize) -> Self {
        Self {
            polls,
            ending: Ending::Fail,
        }
    }

    pub fn never() -> Self {
        Self {
            polls: usize::MAX,
            ending: Ending::Never,
        }
    }
}

struct Running {
    task: StageTask,
    polls_left: usize,
    ending: Ending,
}

/// Runner whose stages resolve after a scripted number of polls
///
/// A successful stage writes its outputs to the attached workspace.
#[derive(Default)]
pub struct FakeRunner {
    scripts: HashMap<StageName, Script>,
    /// Pipelines whose submissions panic
    panics: Vec<String>,
    workspace: Option<Arc<MemoryArtifactStore>>,
    running: Mutex<HashMap<String, Running>>,
    submitted: Mutex<Vec<StageTask>>,
    cancelled: Mutex<Vec<StageName>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, stage: StageName, script: Script) -> Self {
        self.scripts.insert(stage, script);
        self
    }

    pub fn panic_for(mut self, pipeline_id: &str) -> Self {
        self.panics.push(pipeline_id.to_string());
        self
    }

    pub fn with_workspace(mut self, workspace: Arc<MemoryArtifactStore>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn submitted(&self) -> Vec<StageTask> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_stages(&self) -> Vec<StageName> {
        self.submitted().iter().map(StageTask::stage).collect()
    }

    pub fn cancelled(&self) -> Vec<StageName> {
        self.cancelled.lock().unwrap().clone()
    }

    fn write_outputs(&self, task: &StageTask) {
        let Some(workspace) = &self.workspace else {
            return;
        };

        for key in outputs_of(task) {
            workspace.insert("workspace", &key, format!("{} output", task));
        }
    }
}

/// Keys a real tool would leave behind for a task
fn outputs_of(task: &StageTask) -> Vec<String> {
    match task {
        StageTask::QualityCheck { output_dir, .. } => {
            vec![format!("{}/{}", output_dir, QUALITY_REPORT)]
        }
        StageTask::Strandedness { output_dir, .. } => {
            vec![format!("{}/{}", output_dir, LIB_FORMAT_REPORT)]
        }
        StageTask::Trimming {
            reads, output_dir, ..
        } => {
            let names: Vec<String> = reads
                .iter()
                .map(|key| key.rsplit('/').next().unwrap_or(key).to_string())
                .collect();
            TrimGaloreNaming
                .trimmed_reads(&names)
                .iter()
                .map(|name| format!("{}/{}", output_dir, name))
                .collect()
        }
        StageTask::Alignment { output_dir, .. } => SIGNAL_FILES
            .iter()
            .map(|name| format!("{}/{}", output_dir, name))
            .collect(),
        StageTask::Conversion { bigwig, .. } => vec![bigwig.clone()],
    }
}

#[async_trait]
impl TaskRunner for FakeRunner {
    async fn submit(&self, task: StageTask) -> Result<StageHandle, StageFailure> {
        if self.panics.iter().any(|id| id == task.pipeline_id().as_str()) {
            panic!("runner crashed on {}", task);
        }

        let script = self
            .scripts
            .get(&task.stage())
            .copied()
            .unwrap_or(Script::succeed_after(1));
        let handle = StageHandle::new(task.stage(), task.pipeline_id().clone());

        self.submitted.lock().unwrap().push(task.clone());
        self.running.lock().unwrap().insert(
            handle.id.to_string(),
            Running {
                task,
                polls_left: script.polls,
                ending: script.ending,
            },
        );
        Ok(handle)
    }

    async fn poll(&self, handle: &StageHandle, timeout: Duration) -> PollResult {
        let resolved = {
            let mut running = self.running.lock().unwrap();
            let Some(entry) = running.get_mut(&handle.id.to_string()) else {
                return PollResult::Failed(StageFailure::new(
                    handle.stage,
                    FailureKind::Internal,
                    "unknown handle",
                ));
            };

            entry.polls_left = entry.polls_left.saturating_sub(1);
            if entry.polls_left == 0 && entry.ending != Ending::Never {
                running.remove(&handle.id.to_string())
            } else {
                None
            }
        };

        let Some(entry) = resolved else {
            tokio::time::sleep(timeout).await;
            return PollResult::Pending;
        };

        match entry.ending {
            Ending::Fail => PollResult::Failed(StageFailure::new(
                handle.stage,
                FailureKind::Tool,
                "exit code 1",
            )),
            ending => {
                if ending == Ending::Succeed {
                    self.write_outputs(&entry.task);
                }
                PollResult::Done(StageOutput {
                    stage: handle.stage,
                    diagnostics: String::new(),
                    elapsed: Duration::ZERO,
                })
            }
        }
    }

    async fn cancel(&self, handle: &StageHandle) {
        if self
            .running
            .lock()
            .unwrap()
            .remove(&handle.id.to_string())
            .is_some()
        {
            self.cancelled.lock().unwrap().push(handle.stage);
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(1)
    }
}
