//! Error taxonomy for pipeline runs

use thiserror::Error;

use crate::domain::stage::{StageFailure, StageName};

/// Broad class of a pipeline error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network blip or poll timeout; retried where it occurs
    Transient,
    /// A stage reported failure
    Stage,
    /// Structurally wrong input or output; never retried
    DataIntegrity,
    /// Missing credential or invalid setting; fatal at startup
    Configuration,
}

/// Errors raised while driving a sample through the pipeline
///
/// The orchestrator folds every one of these into a `PipelineOutcome`;
/// none of them escape to the batch dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("transient error during {stage} after {attempts} attempt(s): {message}")]
    Transient {
        stage: StageName,
        attempts: usize,
        message: String,
    },

    #[error("{stage} failed: {message}")]
    Stage { stage: StageName, message: String },

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Transient { .. } => ErrorKind::Transient,
            PipelineError::Stage { .. } => ErrorKind::Stage,
            PipelineError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            PipelineError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn stage(stage: StageName, message: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage,
            message: message.into(),
        }
    }
}

impl From<StageFailure> for PipelineError {
    fn from(failure: StageFailure) -> Self {
        // A runner only reports transient failures once its own retry budget
        // is spent, at which point they count as stage errors.
        PipelineError::Stage {
            stage: failure.stage,
            message: format!("{}: {}", failure.kind, failure.message),
        }
    }
}
