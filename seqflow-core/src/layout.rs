//! Workspace key layout
//!
//! Every artifact a sample produces lives under its pipeline ID prefix in the
//! workspace container. Samples never write outside their own prefix, which is
//! what keeps concurrent samples from stepping on each other. Shared reference
//! data under `references/` is prepared at startup and only read by samples.

use crate::domain::sample::PipelineId;
use crate::naming::TrimNaming;

/// Signal files written by the aligner, relative to the alignment directory
pub const SIGNAL_FILES: [&str; 2] = ["Signal.Unique.str1.out.wig", "Signal.Unique.str2.out.wig"];

/// Quality-check report produced when reads are streamed through stdin
pub const QUALITY_REPORT: &str = "stdin_fastqc.html";

/// Library-type report written by the strandedness quantification
pub const LIB_FORMAT_REPORT: &str = "lib_format_counts.json";

/// Key builder for one sample's workspace namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    pipeline_id: PipelineId,
}

impl SampleLayout {
    pub fn new(pipeline_id: PipelineId) -> Self {
        Self { pipeline_id }
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        &self.pipeline_id
    }

    /// Listing prefix covering everything the sample owns
    pub fn prefix(&self) -> String {
        format!("{}/", self.pipeline_id)
    }

    fn key(&self, relative: &str) -> String {
        format!("{}/{}", self.pipeline_id, relative)
    }

    pub fn read(&self, file_name: &str) -> String {
        self.key(&format!("reads/{}", file_name))
    }

    pub fn subsampled_read(&self, file_name: &str) -> String {
        self.key(&format!("reads/subsampled/{}", file_name))
    }

    pub fn quality_dir(&self) -> String {
        self.key("fastqc")
    }

    pub fn quality_report(&self) -> String {
        self.key(&format!("fastqc/{}", QUALITY_REPORT))
    }

    pub fn strandedness_dir(&self) -> String {
        self.key("strandedness")
    }

    pub fn lib_format_report(&self) -> String {
        self.key(&format!("strandedness/{}", LIB_FORMAT_REPORT))
    }

    pub fn trimming_dir(&self) -> String {
        self.key("trimgalore")
    }

    pub fn trimmed_reads(&self, naming: &dyn TrimNaming, read_files: &[String]) -> Vec<String> {
        naming
            .trimmed_reads(read_files)
            .iter()
            .map(|name| self.key(&format!("trimgalore/{}", name)))
            .collect()
    }

    pub fn alignment_dir(&self) -> String {
        self.key("staralign")
    }

    pub fn signal_files(&self) -> Vec<String> {
        SIGNAL_FILES
            .iter()
            .map(|name| self.key(&format!("staralign/{}", name)))
            .collect()
    }

    /// Relative path of a key inside the sample namespace
    pub fn relative<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.prefix())
    }
}

/// BigWig key for a wiggle signal key
pub fn bigwig_for(wig_key: &str) -> String {
    match wig_key.strip_suffix(".wig") {
        Some(stem) => format!("{}.bw", stem),
        None => format!("{}.bw", wig_key),
    }
}
