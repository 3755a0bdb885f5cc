//! Stage domain types
//!
//! Stages are the units of pipeline work. Each one has a name, a set of
//! expected output artifacts used for cache decisions, and, once submitted
//! to a runner, a handle that can be polled or cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::artifact::ArtifactRef;
use super::sample::PipelineId;

/// Name of a pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Download,
    QualityCheck,
    Strandedness,
    Trimming,
    Alignment,
    Conversion,
    Upload,
}

impl StageName {
    /// Stages fanned out after the inputs are ready
    pub const FAN_OUT: [StageName; 3] = [
        StageName::QualityCheck,
        StageName::Strandedness,
        StageName::Trimming,
    ];

    pub const ALL: [StageName; 7] = [
        StageName::Download,
        StageName::QualityCheck,
        StageName::Strandedness,
        StageName::Trimming,
        StageName::Alignment,
        StageName::Conversion,
        StageName::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Download => "download",
            StageName::QualityCheck => "quality-check",
            StageName::Strandedness => "strandedness",
            StageName::Trimming => "trimming",
            StageName::Alignment => "alignment",
            StageName::Conversion => "conversion",
            StageName::Upload => "upload",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for StageName {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// What the cache guard needs to decide whether a stage can be skipped
///
/// `expected_outputs` are keys in the workspace container. A `*` in a key
/// matches any run of characters within the listing under its prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: StageName,
    pub expected_outputs: Vec<String>,
    pub force_recompute: bool,
    /// Remote source of a download stage
    pub source: Option<ArtifactRef>,
}

impl StageDescriptor {
    pub fn new(name: StageName, expected_outputs: Vec<String>) -> Self {
        Self {
            name,
            expected_outputs,
            force_recompute: false,
            source: None,
        }
    }

    pub fn force_recompute(mut self, force: bool) -> Self {
        self.force_recompute = force;
        self
    }

    pub fn with_source(mut self, source: ArtifactRef) -> Self {
        self.source = Some(source);
        self
    }
}

/// Cache guard decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    Run,
    Skip,
}

/// Reference to a stage submitted to a runner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageHandle {
    pub id: Uuid,
    pub stage: StageName,
    pub pipeline_id: PipelineId,
    pub submitted_at: DateTime<Utc>,
}

impl StageHandle {
    pub fn new(stage: StageName, pipeline_id: PipelineId) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            pipeline_id,
            submitted_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.pipeline_id, self.stage, self.id)
    }
}

/// Value produced by a successful stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: StageName,
    /// Captured tool output, kept for diagnostics only
    pub diagnostics: String,
    pub elapsed: Duration,
}

/// Classification of a stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Tool exited non-zero or reported an error
    Tool,
    /// Transient retry budget exhausted
    Transient,
    Cancelled,
    TimedOut,
    /// Runner lost track of the task (panic, unknown handle)
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Tool => write!(f, "tool error"),
            FailureKind::Transient => write!(f, "transient error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::TimedOut => write!(f, "timed out"),
            FailureKind::Internal => write!(f, "internal error"),
        }
    }
}

/// Failure reported by a runner for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} {kind}: {message}")]
pub struct StageFailure {
    pub stage: StageName,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: StageName, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled(stage: StageName) -> Self {
        Self::new(stage, FailureKind::Cancelled, "cancelled")
    }
}

/// Result of probing a submitted stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Still running when the poll deadline passed
    Pending,
    Done(StageOutput),
    Failed(StageFailure),
}

impl PollResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollResult::Pending)
    }
}

/// Per-stage status reported in a pipeline outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    NotRun,
    Skipped,
    Completed,
    Failed(String),
    Cancelled,
}

impl StageStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::NotRun => write!(f, "not run"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed(reason) => write!(f, "failed: {}", reason),
            StageStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}
