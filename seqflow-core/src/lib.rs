//! Seqflow Core
//!
//! Core types and abstractions for the seqflow sequencing pipeline.
//!
//! This crate contains:
//! - Domain types: samples, stages, handles, poll results and outcomes
//! - Error taxonomy shared by the store, runner and orchestrator
//! - Workspace key layout and trimmed-read naming conventions
//! - Grouping of raw read listings into samples

pub mod domain;
pub mod error;
pub mod grouping;
pub mod layout;
pub mod naming;

pub use domain::artifact::ArtifactRef;
pub use domain::outcome::{OutcomeStatus, Phase, PipelineOutcome, PipelineState};
pub use domain::sample::{PipelineId, SampleSpec};
pub use domain::stage::{
    FailureKind, PollResult, RunDecision, StageDescriptor, StageFailure, StageHandle, StageName,
    StageOutput, StageStatus,
};
pub use error::{ErrorKind, PipelineError};
pub use grouping::{READ_SUFFIX, TaskGroup, group_samples, validate_groups};
pub use layout::SampleLayout;
pub use naming::{TrimGaloreNaming, TrimNaming};
