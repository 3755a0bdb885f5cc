//! Sample domain types

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::layout::SampleLayout;

/// Deterministic identifier of one sample's pipeline run
///
/// Derived from the sample name, so re-submitting a sample lands in the same
/// artifact namespace and resumes against whatever is already there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Derives the pipeline ID for a sample name
    pub fn for_sample(sample_name: &str) -> Self {
        Self(format!("pl-{}", sample_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sample and its read files
///
/// Holds exactly one (single-end) or two (paired-end) read file names.
/// Any other count is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSpec {
    sample_name: String,
    read_files: Vec<String>,
}

impl SampleSpec {
    /// Creates a sample spec, validating the read file count
    pub fn new(
        sample_name: impl Into<String>,
        read_files: Vec<String>,
    ) -> Result<Self, PipelineError> {
        let sample_name = sample_name.into();

        if sample_name.is_empty() {
            return Err(PipelineError::DataIntegrity(
                "sample name cannot be empty".to_string(),
            ));
        }

        if read_files.is_empty() || read_files.len() > 2 {
            return Err(PipelineError::DataIntegrity(format!(
                "sample {} has {} read file(s), expected 1 (single-end) or 2 (paired-end)",
                sample_name,
                read_files.len()
            )));
        }

        if read_files.iter().any(|f| f.is_empty() || f.contains('/')) {
            return Err(PipelineError::DataIntegrity(format!(
                "sample {} has an invalid read file name: {:?}",
                sample_name, read_files
            )));
        }

        Ok(Self {
            sample_name,
            read_files,
        })
    }

    /// Creates a sample spec from a dispatcher group
    ///
    /// Members named with the paired `<sample>_<n>` convention must come in
    /// exactly two; members without an underscore are single-end and must be
    /// alone. Mixed groups are rejected.
    pub fn from_group(sample_name: &str, members: &[String]) -> Result<Self, PipelineError> {
        let paired = members.iter().filter(|m| m.contains('_')).count();

        if paired > 0 && paired != members.len() {
            return Err(PipelineError::DataIntegrity(format!(
                "sample {} mixes single-end and paired-end files: {:?}",
                sample_name, members
            )));
        }

        if paired > 0 && paired != 2 {
            return Err(PipelineError::DataIntegrity(format!(
                "paired-end sample {} has {} member(s), expected 2: {:?}",
                sample_name, paired, members
            )));
        }

        if paired == 0 && members.len() > 1 {
            return Err(PipelineError::DataIntegrity(format!(
                "single-end sample {} has {} files: {:?}",
                sample_name,
                members.len(),
                members
            )));
        }

        Self::new(sample_name, members.to_vec())
    }

    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    pub fn read_files(&self) -> &[String] {
        &self.read_files
    }

    pub fn is_paired(&self) -> bool {
        self.read_files.len() == 2
    }

    pub fn pipeline_id(&self) -> PipelineId {
        PipelineId::for_sample(&self.sample_name)
    }

    /// Workspace key layout for this sample
    pub fn layout(&self) -> SampleLayout {
        SampleLayout::new(self.pipeline_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pipeline_id_is_deterministic() {
        assert_eq!(PipelineId::for_sample("S1"), PipelineId::for_sample("S1"));
        assert_eq!(PipelineId::for_sample("S1").as_str(), "pl-S1");
    }

    #[test]
    fn test_single_and_paired_specs() {
        let single = SampleSpec::new("S2", files(&["S2.fastq.gz"])).unwrap();
        assert!(!single.is_paired());

        let paired = SampleSpec::new("S1", files(&["S1_1.fastq.gz", "S1_2.fastq.gz"])).unwrap();
        assert!(paired.is_paired());
        assert_eq!(paired.pipeline_id().as_str(), "pl-S1");
    }

    #[test]
    fn test_rejects_zero_or_more_than_two_reads() {
        assert!(matches!(
            SampleSpec::new("S1", vec![]),
            Err(PipelineError::DataIntegrity(_))
        ));
        assert!(matches!(
            SampleSpec::new("S1", files(&["a_1.fq", "a_2.fq", "a_3.fq"])),
            Err(PipelineError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_rejects_empty_names() {
        assert!(SampleSpec::new("", files(&["S1.fastq.gz"])).is_err());
        assert!(SampleSpec::new("S1", files(&[""])).is_err());
    }

    #[test]
    fn test_from_group_requires_pairs() {
        assert!(SampleSpec::from_group("S1", &files(&["S1_1.fastq.gz"])).is_err());
        assert!(SampleSpec::from_group("S1", &files(&["S1.fastq.gz", "S1_1.fastq.gz"])).is_err());
        assert!(SampleSpec::from_group("S1", &files(&["S1_1.fastq.gz", "S1_2.fastq.gz"])).is_ok());
        assert!(SampleSpec::from_group("S2", &files(&["S2.fastq.gz"])).is_ok());
    }
}
