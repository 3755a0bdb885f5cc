//! Stage task arguments
//!
//! A `StageTask` is everything a worker needs to run one stage for one
//! sample. Inputs and outputs are workspace keys, never host paths, so a
//! task can be queued and picked up by a worker with a different mount
//! point.

use seqflow_core::{PipelineId, SampleLayout, SampleSpec, StageName, TrimNaming};
use serde::{Deserialize, Serialize};

/// Typed arguments for one submitted stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum StageTask {
    /// Quality report over the raw reads
    QualityCheck {
        pipeline_id: PipelineId,
        reads: Vec<String>,
        output_dir: String,
    },

    /// Library-type inference on a subsample of the reads
    Strandedness {
        pipeline_id: PipelineId,
        reads: Vec<String>,
        subsampled: Vec<String>,
        output_dir: String,
    },

    /// Adapter and quality trimming
    Trimming {
        pipeline_id: PipelineId,
        reads: Vec<String>,
        output_dir: String,
    },

    /// Alignment of the trimmed reads, producing signal tracks
    Alignment {
        pipeline_id: PipelineId,
        trimmed: Vec<String>,
        output_dir: String,
    },

    /// Signal track conversion for a single wiggle file
    Conversion {
        pipeline_id: PipelineId,
        wig: String,
        bigwig: String,
    },
}

impl StageTask {
    pub fn quality_check(sample: &SampleSpec) -> Self {
        let layout = sample.layout();
        Self::QualityCheck {
            pipeline_id: sample.pipeline_id(),
            reads: read_keys(&layout, sample),
            output_dir: layout.quality_dir(),
        }
    }

    pub fn strandedness(sample: &SampleSpec) -> Self {
        let layout = sample.layout();
        Self::Strandedness {
            pipeline_id: sample.pipeline_id(),
            reads: read_keys(&layout, sample),
            subsampled: sample
                .read_files()
                .iter()
                .map(|f| layout.subsampled_read(f))
                .collect(),
            output_dir: layout.strandedness_dir(),
        }
    }

    pub fn trimming(sample: &SampleSpec) -> Self {
        let layout = sample.layout();
        Self::Trimming {
            pipeline_id: sample.pipeline_id(),
            reads: read_keys(&layout, sample),
            output_dir: layout.trimming_dir(),
        }
    }

    pub fn alignment(sample: &SampleSpec, naming: &dyn TrimNaming) -> Self {
        let layout = sample.layout();
        Self::Alignment {
            pipeline_id: sample.pipeline_id(),
            trimmed: layout.trimmed_reads(naming, sample.read_files()),
            output_dir: layout.alignment_dir(),
        }
    }

    pub fn conversion(pipeline_id: PipelineId, wig: String) -> Self {
        let bigwig = seqflow_core::layout::bigwig_for(&wig);
        Self::Conversion {
            pipeline_id,
            wig,
            bigwig,
        }
    }

    /// Task for a fan-out stage, or `None` for stages that are not submitted
    /// on their own
    pub fn for_stage(stage: StageName, sample: &SampleSpec) -> Option<Self> {
        match stage {
            StageName::QualityCheck => Some(Self::quality_check(sample)),
            StageName::Strandedness => Some(Self::strandedness(sample)),
            StageName::Trimming => Some(Self::trimming(sample)),
            _ => None,
        }
    }

    pub fn stage(&self) -> StageName {
        match self {
            Self::QualityCheck { .. } => StageName::QualityCheck,
            Self::Strandedness { .. } => StageName::Strandedness,
            Self::Trimming { .. } => StageName::Trimming,
            Self::Alignment { .. } => StageName::Alignment,
            Self::Conversion { .. } => StageName::Conversion,
        }
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        match self {
            Self::QualityCheck { pipeline_id, .. }
            | Self::Strandedness { pipeline_id, .. }
            | Self::Trimming { pipeline_id, .. }
            | Self::Alignment { pipeline_id, .. }
            | Self::Conversion { pipeline_id, .. } => pipeline_id,
        }
    }
}

impl std::fmt::Display for StageTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pipeline_id(), self.stage())
    }
}

fn read_keys(layout: &SampleLayout, sample: &SampleSpec) -> Vec<String> {
    sample.read_files().iter().map(|f| layout.read(f)).collect()
}
