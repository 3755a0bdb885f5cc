//! Per-sample pipeline state machine
//!
//! Drives one sample through download, the quality-check / strandedness /
//! trimming fan-out, alignment, signal conversion and upload. Every stage is
//! guarded by the cache so a re-run resumes where the last one stopped.
//! Failures never roll back artifacts; they end the run and are folded into
//! the returned `PipelineOutcome`.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use seqflow_core::layout::bigwig_for;
use seqflow_core::{
    ArtifactRef, FailureKind, OutcomeStatus, Phase, PipelineError, PipelineId, PipelineOutcome,
    PipelineState, RunDecision, SampleSpec, StageDescriptor, StageHandle, StageName, StageStatus,
    TrimGaloreNaming, TrimNaming,
};
use seqflow_runner::{StageTask, TaskRunner};
use seqflow_store::{ArtifactStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache;
use crate::config::Config;
use crate::join::{JoinTiming, Resolution, join_handles};
use crate::transfer::{Transfers, store_failure};

/// Runs the stage pipeline for individual samples
pub struct Orchestrator {
    runner: Arc<dyn TaskRunner>,
    workspace: Arc<dyn ArtifactStore>,
    remote: Arc<dyn ArtifactStore>,
    naming: Arc<dyn TrimNaming>,
    config: Config,
}

/// Why a run stopped
#[derive(Debug)]
struct Halt {
    phase: Phase,
    stage: StageName,
    reason: String,
}

impl Halt {
    fn new(phase: Phase, stage: StageName, err: impl std::fmt::Display) -> Self {
        Self {
            phase,
            stage,
            reason: err.to_string(),
        }
    }
}

/// Stage statuses and transitions accumulated during one run
struct RunRecord {
    sample_name: String,
    pipeline_id: PipelineId,
    stages: BTreeMap<StageName, StageStatus>,
    transitions: Vec<PipelineState>,
    started_at: DateTime<Utc>,
}

impl RunRecord {
    fn new(sample: &SampleSpec) -> Self {
        Self {
            sample_name: sample.sample_name().to_string(),
            pipeline_id: sample.pipeline_id(),
            stages: StageName::ALL
                .into_iter()
                .map(|stage| (stage, StageStatus::NotRun))
                .collect(),
            transitions: vec![PipelineState::Init],
            started_at: Utc::now(),
        }
    }

    fn enter(&mut self, state: PipelineState) {
        info!("{}: entering {}", self.pipeline_id, state);
        self.transitions.push(state);
    }

    fn set(&mut self, stage: StageName, status: StageStatus) {
        self.stages.insert(stage, status);
    }

    fn finish(mut self, result: Result<(), Halt>) -> PipelineOutcome {
        let status = match result {
            Ok(()) => {
                self.enter(PipelineState::Completed);
                OutcomeStatus::Completed
            }
            Err(halt) => {
                error!(
                    "{}: {} failed during {}: {}",
                    self.pipeline_id, halt.stage, halt.phase, halt.reason
                );
                if !self.stages.get(&halt.stage).is_some_and(StageStatus::is_failed) {
                    self.set(halt.stage, StageStatus::Failed(halt.reason.clone()));
                }
                self.enter(PipelineState::Failed {
                    phase: halt.phase,
                    stage: halt.stage,
                    reason: halt.reason.clone(),
                });
                OutcomeStatus::Failed {
                    phase: halt.phase,
                    stage: halt.stage,
                    reason: halt.reason,
                }
            }
        };

        PipelineOutcome {
            sample_name: self.sample_name,
            pipeline_id: self.pipeline_id,
            status,
            stages: self.stages,
            transitions: self.transitions,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// A submitted stage and the outputs it must leave behind
struct Submitted {
    handle: StageHandle,
    descriptor: StageDescriptor,
}

/// Statuses resolved by one join, plus the failure that stopped it
#[derive(Default)]
struct JoinedStages {
    statuses: Vec<(StageName, StageStatus)>,
    fatal: Option<(StageName, PipelineError)>,
}

impl Orchestrator {
    /// Creates an orchestrator using Trim Galore output naming
    ///
    /// # Arguments
    /// * `runner` - Runner stage tasks are submitted to
    /// * `workspace` - Shared data volume holding sample workspaces
    /// * `remote` - Remote store holding raw reads and receiving results
    /// * `config` - Orchestrator configuration
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        workspace: Arc<dyn ArtifactStore>,
        remote: Arc<dyn ArtifactStore>,
        config: Config,
    ) -> Self {
        Self {
            runner,
            workspace,
            remote,
            naming: Arc::new(TrimGaloreNaming),
            config,
        }
    }

    pub fn with_naming(mut self, naming: Arc<dyn TrimNaming>) -> Self {
        self.naming = naming;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the full pipeline for one sample
    ///
    /// Never fails: every error ends up in the returned outcome.
    pub async fn run(&self, sample: &SampleSpec) -> PipelineOutcome {
        let mut record = RunRecord::new(sample);
        info!(
            "{}: starting pipeline for {} ({})",
            record.pipeline_id,
            sample.sample_name(),
            if sample.is_paired() {
                "paired-end"
            } else {
                "single-end"
            }
        );

        let result = self.drive(sample, &mut record).await;
        let outcome = record.finish(result);

        if outcome.is_completed() {
            info!("{}: pipeline completed", outcome.pipeline_id);
        }
        outcome
    }

    async fn drive(&self, sample: &SampleSpec, record: &mut RunRecord) -> Result<(), Halt> {
        let status = self
            .fetch_reads(sample, self.config.force_recompute)
            .await
            .map_err(|e| Halt::new(Phase::Download, StageName::Download, e))?;
        record.set(StageName::Download, status);
        record.enter(PipelineState::InputsReady);

        record.enter(PipelineState::FanOutRunning);
        self.fan_out(sample, record).await?;
        record.enter(PipelineState::FanOutJoined);

        record.enter(PipelineState::AlignRunning);
        let status = self
            .run_one(sample, StageName::Alignment, self.config.force_recompute)
            .await
            .map_err(|e| Halt::new(Phase::Align, StageName::Alignment, e))?;
        record.set(StageName::Alignment, status);
        record.enter(PipelineState::AlignDone);

        record.enter(PipelineState::ConvertRunning);
        self.convert(sample, record).await?;
        record.enter(PipelineState::ConvertDone);

        record.enter(PipelineState::UploadRunning);
        self.transfers()
            .upload(&sample.layout(), &self.config.results_container)
            .await
            .map_err(|e| Halt::new(Phase::Upload, StageName::Upload, e))?;
        record.set(StageName::Upload, StageStatus::Completed);

        Ok(())
    }

    /// Runs a single stage for a sample, honoring the cache guard
    ///
    /// Used for debugging one stage in isolation. The stage's inputs are
    /// expected to be in the workspace already.
    pub async fn run_stage(
        &self,
        sample: &SampleSpec,
        stage: StageName,
        force: bool,
    ) -> Result<StageStatus, PipelineError> {
        let force = force || self.config.force_recompute;
        info!("{}: running {} on its own", sample.pipeline_id(), stage);

        match stage {
            StageName::Download => self.fetch_reads(sample, force).await,
            StageName::Upload => {
                self.transfers()
                    .upload(&sample.layout(), &self.config.results_container)
                    .await?;
                Ok(StageStatus::Completed)
            }
            _ => self.run_one(sample, stage, force).await,
        }
    }

    /// Downloads every read file the workspace lacks
    async fn fetch_reads(
        &self,
        sample: &SampleSpec,
        force: bool,
    ) -> Result<StageStatus, PipelineError> {
        let layout = sample.layout();
        let transfers = self.transfers();
        let mut fetched = 0;

        for file in sample.read_files() {
            let source = ArtifactRef::new(&self.config.reads_container, file);
            let descriptor = StageDescriptor::new(StageName::Download, vec![layout.read(file)])
                .force_recompute(force)
                .with_source(source.clone());

            if self.should_fetch(&descriptor).await? == RunDecision::Skip {
                info!("{}: {} already downloaded", layout.pipeline_id(), file);
                continue;
            }

            transfers.download(&source, &layout.read(file)).await?;
            fetched += 1;
        }

        Ok(if fetched > 0 {
            StageStatus::Completed
        } else {
            StageStatus::Skipped
        })
    }

    /// Submits the fan-out stages and joins them
    async fn fan_out(&self, sample: &SampleSpec, record: &mut RunRecord) -> Result<(), Halt> {
        let pipeline_id = sample.pipeline_id();
        let mut submitted = Vec::new();

        for stage in StageName::FAN_OUT {
            let halt = |e: PipelineError| Halt::new(Phase::FanOut, stage, e);

            for (descriptor, task) in self.stage_tasks(sample, stage) {
                let descriptor = descriptor.force_recompute(self.config.force_recompute);

                if self.should_run(&descriptor).await.map_err(halt)? == RunDecision::Skip {
                    info!("{}: {} outputs present, skipping", pipeline_id, stage);
                    record.set(stage, StageStatus::Skipped);
                    continue;
                }

                match self.runner.submit(task).await {
                    Ok(handle) => {
                        info!("{}: submitted {}", pipeline_id, handle);
                        submitted.push(Submitted { handle, descriptor });
                    }
                    Err(failure) if self.config.is_fatal(stage) => {
                        self.cancel_submitted(&submitted).await;
                        for outstanding in &submitted {
                            record.set(outstanding.handle.stage, StageStatus::Cancelled);
                        }
                        return Err(halt(failure.into()));
                    }
                    Err(failure) => {
                        warn!("{}: {} could not be submitted: {}", pipeline_id, stage, failure);
                        record.set(stage, StageStatus::Failed(failure.to_string()));
                    }
                }
            }
        }

        let joined = self
            .join(submitted, |stage| self.config.is_fatal(stage))
            .await;

        for (stage, status) in joined.statuses {
            if let StageStatus::Failed(reason) = &status {
                if !self.config.is_fatal(stage) {
                    warn!("{}: {} failed but is not fatal: {}", pipeline_id, stage, reason);
                }
            }
            record.set(stage, status);
        }

        match joined.fatal {
            Some((stage, e)) => Err(Halt::new(Phase::FanOut, stage, e)),
            None => Ok(()),
        }
    }

    /// Converts every signal file, in parallel
    async fn convert(&self, sample: &SampleSpec, record: &mut RunRecord) -> Result<(), Halt> {
        let stage = StageName::Conversion;
        let halt = |e: PipelineError| Halt::new(Phase::Convert, stage, e);
        let mut submitted = Vec::new();

        for (descriptor, task) in self.stage_tasks(sample, stage) {
            let descriptor = descriptor.force_recompute(self.config.force_recompute);

            if self.should_run(&descriptor).await.map_err(halt)? == RunDecision::Skip {
                continue;
            }

            match self.runner.submit(task).await {
                Ok(handle) => submitted.push(Submitted { handle, descriptor }),
                Err(failure) => {
                    self.cancel_submitted(&submitted).await;
                    return Err(halt(failure.into()));
                }
            }
        }

        if submitted.is_empty() {
            info!("{}: all signal tracks present, skipping", sample.pipeline_id());
            record.set(stage, StageStatus::Skipped);
            return Ok(());
        }

        let joined = self.join(submitted, |_| true).await;
        if let Some((_, e)) = joined.fatal {
            return Err(halt(e));
        }

        record.set(stage, StageStatus::Completed);
        Ok(())
    }

    /// Runs every task of one stage to completion, one after the other
    ///
    /// Each task is bounded by `stage_timeout` and cancelled when it expires.
    async fn run_one(
        &self,
        sample: &SampleSpec,
        stage: StageName,
        force: bool,
    ) -> Result<StageStatus, PipelineError> {
        let mut ran = false;

        for (descriptor, task) in self.stage_tasks(sample, stage) {
            let descriptor = descriptor.force_recompute(force);

            if self.should_run(&descriptor).await? == RunDecision::Skip {
                info!("{}: {} outputs present, skipping", sample.pipeline_id(), stage);
                continue;
            }

            let handle = self.runner.submit(task).await?;
            info!("{}: submitted {}", sample.pipeline_id(), handle);

            // The join verifies outputs of a successful task
            let joined = self.join(vec![Submitted { handle, descriptor }], |_| true).await;
            if let Some((_, e)) = joined.fatal {
                return Err(e);
            }
            info!("{}: {} finished", sample.pipeline_id(), stage);
            ran = true;
        }

        Ok(if ran {
            StageStatus::Completed
        } else {
            StageStatus::Skipped
        })
    }

    /// Joins submitted stages and verifies the outputs of the ones that
    /// reported success
    async fn join(
        &self,
        submitted: Vec<Submitted>,
        is_fatal: impl Fn(StageName) -> bool,
    ) -> JoinedStages {
        let timing = JoinTiming {
            poll_interval: self.config.poll_interval,
            timeout: self.config.stage_timeout,
        };
        let handles = submitted.iter().map(|s| s.handle.clone()).collect();
        let report = join_handles(self.runner.as_ref(), handles, timing, &is_fatal).await;

        let mut joined = JoinedStages::default();
        if let Some(failure) = &report.fatal {
            joined.fatal = Some((failure.stage, failure.clone().into()));
        }

        for (handle, resolution) in report.resolved {
            let status = match resolution {
                Resolution::Done(_) => {
                    let descriptor = submitted
                        .iter()
                        .find(|s| s.handle.id == handle.id)
                        .map(|s| &s.descriptor);

                    match descriptor {
                        Some(descriptor) => match self.verify(descriptor).await {
                            Ok(()) => StageStatus::Completed,
                            Err(e) => {
                                let reason = e.to_string();
                                if joined.fatal.is_none() && is_fatal(handle.stage) {
                                    joined.fatal = Some((handle.stage, e));
                                }
                                StageStatus::Failed(reason)
                            }
                        },
                        None => StageStatus::Completed,
                    }
                }
                Resolution::Failed(failure) if failure.kind == FailureKind::Cancelled => {
                    StageStatus::Cancelled
                }
                Resolution::Failed(failure) => {
                    StageStatus::Failed(PipelineError::from(failure).to_string())
                }
                Resolution::Cancelled => StageStatus::Cancelled,
            };
            joined.statuses.push((handle.stage, status));
        }

        joined
    }

    async fn cancel_submitted(&self, submitted: &[Submitted]) {
        join_all(submitted.iter().map(|s| {
            warn!("Cancelling outstanding {}", s.handle);
            self.runner.cancel(&s.handle)
        }))
        .await;
    }

    /// Descriptor and task for every unit of work a stage submits
    fn stage_tasks(&self, sample: &SampleSpec, stage: StageName) -> Vec<(StageDescriptor, StageTask)> {
        let layout = sample.layout();

        match stage {
            StageName::QualityCheck => vec![(
                StageDescriptor::new(stage, vec![layout.quality_report()]),
                StageTask::quality_check(sample),
            )],
            StageName::Strandedness => vec![(
                StageDescriptor::new(stage, vec![layout.lib_format_report()]),
                StageTask::strandedness(sample),
            )],
            StageName::Trimming => vec![(
                StageDescriptor::new(
                    stage,
                    layout.trimmed_reads(self.naming.as_ref(), sample.read_files()),
                ),
                StageTask::trimming(sample),
            )],
            StageName::Alignment => vec![(
                StageDescriptor::new(stage, layout.signal_files()),
                StageTask::alignment(sample, self.naming.as_ref()),
            )],
            StageName::Conversion => layout
                .signal_files()
                .into_iter()
                .map(|wig| {
                    (
                        StageDescriptor::new(stage, vec![bigwig_for(&wig)]),
                        StageTask::conversion(sample.pipeline_id(), wig),
                    )
                })
                .collect(),
            StageName::Download | StageName::Upload => Vec::new(),
        }
    }

    fn transfers(&self) -> Transfers<'_> {
        Transfers {
            workspace: self.workspace.as_ref(),
            workspace_container: &self.config.workspace_container,
            remote: self.remote.as_ref(),
            retry: self.config.store_retry,
        }
    }

    async fn should_run(&self, descriptor: &StageDescriptor) -> Result<RunDecision, PipelineError> {
        let workspace = self.workspace.as_ref();
        let container = self.config.workspace_container.as_str();

        self.config
            .store_retry
            .run(
                "cache check",
                || cache::should_run(descriptor, workspace, container),
                StoreError::is_transient,
            )
            .await
            .map_err(|(e, attempts)| store_failure(descriptor.name, "cache check", e, attempts))
    }

    async fn should_fetch(&self, descriptor: &StageDescriptor) -> Result<RunDecision, PipelineError> {
        let workspace = self.workspace.as_ref();
        let remote = self.remote.as_ref();
        let container = self.config.workspace_container.as_str();

        self.config
            .store_retry
            .run(
                "cache check",
                || cache::should_fetch(descriptor, workspace, container, remote),
                StoreError::is_transient,
            )
            .await
            .map_err(|(e, attempts)| store_failure(descriptor.name, "cache check", e, attempts))
    }

    async fn verify(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        cache::verify_outputs(
            descriptor,
            self.workspace.as_ref(),
            &self.config.workspace_container,
        )
        .await
    }
}
