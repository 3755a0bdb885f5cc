//! Sample grouping
//!
//! Turns a flat listing of read files into sample groups. A file named
//! `<sample>_<n>.<ext>` belongs to the paired-end sample `<sample>`; a file
//! without an underscore is a single-end sample named after its stem.

use std::collections::BTreeMap;

use crate::domain::sample::SampleSpec;
use crate::error::PipelineError;

/// Suffix identifying raw read files in a listing
pub const READ_SUFFIX: &str = ".fastq.gz";

/// Sample name to member files, in listing order
pub type TaskGroup = BTreeMap<String, Vec<String>>;

/// Group key for one file name
pub fn group_key(file_name: &str) -> &str {
    match file_name.split_once('_') {
        Some((prefix, _)) => prefix,
        None => file_name.split('.').next().unwrap_or(file_name),
    }
}

/// Groups read files by sample, keeping listing order within each group
///
/// # Arguments
/// * `files` - Flat listing of available files
/// * `suffix` - Only names ending with this suffix are considered
pub fn group_samples<S: AsRef<str>>(files: &[S], suffix: &str) -> TaskGroup {
    let mut groups = TaskGroup::new();

    for file in files.iter().map(AsRef::as_ref) {
        if !file.ends_with(suffix) {
            continue;
        }
        groups
            .entry(group_key(file).to_string())
            .or_default()
            .push(file.to_string());
    }

    groups
}

/// Validates every group into a `SampleSpec`
///
/// Invalid groups are returned alongside the valid ones rather than dropped.
pub fn validate_groups(
    groups: &TaskGroup,
) -> (Vec<SampleSpec>, Vec<(String, PipelineError)>) {
    let mut specs = Vec::new();
    let mut rejected = Vec::new();

    for (name, members) in groups {
        match SampleSpec::from_group(name, members) {
            Ok(spec) => specs.push(spec),
            Err(e) => rejected.push((name.clone(), e)),
        }
    }

    (specs, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_paired_and_single_end() {
        let groups = group_samples(
            &["S1_1.fastq.gz", "S1_2.fastq.gz", "S2.fastq.gz"],
            READ_SUFFIX,
        );

        let mut expected = TaskGroup::new();
        expected.insert(
            "S1".to_string(),
            vec!["S1_1.fastq.gz".to_string(), "S1_2.fastq.gz".to_string()],
        );
        expected.insert("S2".to_string(), vec!["S2.fastq.gz".to_string()]);
        assert_eq!(groups, expected);
    }

    #[test]
    fn test_keeps_listing_order_within_group() {
        let groups = group_samples(&["S1_2.fastq.gz", "S1_1.fastq.gz"], READ_SUFFIX);
        assert_eq!(groups["S1"], vec!["S1_2.fastq.gz", "S1_1.fastq.gz"]);
    }

    #[test]
    fn test_ignores_other_files() {
        let groups = group_samples(
            &["S1_1.fastq.gz", "README.md", "S3_1.fastq", "notes_v2.txt"],
            READ_SUFFIX,
        );
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key("S1"));
    }

    #[test]
    fn test_group_key_splits_on_first_underscore() {
        assert_eq!(group_key("S1_R1_001.fastq.gz"), "S1");
        assert_eq!(group_key("S2.fastq.gz"), "S2");
        assert_eq!(group_key("S3"), "S3");
    }

    #[test]
    fn test_validate_surfaces_invalid_groups() {
        let groups = group_samples(
            &[
                "S1_1.fastq.gz",
                "S1_2.fastq.gz",
                "S2_1.fastq.gz",
                "S3_1.fastq.gz",
                "S3_2.fastq.gz",
                "S3_3.fastq.gz",
            ],
            READ_SUFFIX,
        );

        let (specs, rejected) = validate_groups(&groups);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].sample_name(), "S1");

        let names: Vec<_> = rejected.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["S2", "S3"]);
        assert!(
            rejected
                .iter()
                .all(|(_, e)| matches!(e, PipelineError::DataIntegrity(_)))
        );
    }
}
