//! Pipeline state and outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::sample::PipelineId;
use super::stage::{StageName, StageStatus};

/// Pipeline phase in which a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Download,
    FanOut,
    Align,
    Convert,
    Upload,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Download => write!(f, "download"),
            Phase::FanOut => write!(f, "fan-out"),
            Phase::Align => write!(f, "align"),
            Phase::Convert => write!(f, "convert"),
            Phase::Upload => write!(f, "upload"),
        }
    }
}

/// States of the per-sample pipeline state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Init,
    InputsReady,
    FanOutRunning,
    FanOutJoined,
    AlignRunning,
    AlignDone,
    ConvertRunning,
    ConvertDone,
    UploadRunning,
    Completed,
    Failed {
        phase: Phase,
        stage: StageName,
        reason: String,
    },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed { .. })
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Failed {
                phase: Phase::FanOut,
                stage,
                reason,
            } => write!(f, "Failed(fan-out, {}, {})", stage, reason),
            PipelineState::Failed { phase, reason, .. } => {
                write!(f, "Failed({}, {})", phase, reason)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

/// Terminal status of one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed {
        phase: Phase,
        stage: StageName,
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

/// Result of running the pipeline for one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub sample_name: String,
    pub pipeline_id: PipelineId,
    pub status: OutcomeStatus,
    pub stages: BTreeMap<StageName, StageStatus>,
    /// Every state the run entered, in order
    pub transitions: Vec<PipelineState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineOutcome {
    /// Outcome for a sample that never started
    pub fn not_started(sample_name: &str, status: OutcomeStatus) -> Self {
        let now = Utc::now();
        Self {
            sample_name: sample_name.to_string(),
            pipeline_id: PipelineId::for_sample(sample_name),
            status,
            stages: StageName::ALL
                .into_iter()
                .map(|stage| (stage, StageStatus::NotRun))
                .collect(),
            transitions: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn skipped(sample_name: &str, reason: impl Into<String>) -> Self {
        Self::not_started(
            sample_name,
            OutcomeStatus::Skipped {
                reason: reason.into(),
            },
        )
    }

    /// Outcome for a sample rejected before reaching the orchestrator
    pub fn rejected(sample_name: &str, reason: impl Into<String>) -> Self {
        Self::not_started(
            sample_name,
            OutcomeStatus::Failed {
                phase: Phase::Download,
                stage: StageName::Download,
                reason: reason.into(),
            },
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed)
    }

    /// Whether the run passed through the given state
    pub fn entered(&self, state: &PipelineState) -> bool {
        self.transitions.contains(state)
    }

    pub fn stage_status(&self, stage: StageName) -> &StageStatus {
        self.stages.get(&stage).unwrap_or(&StageStatus::NotRun)
    }
}
