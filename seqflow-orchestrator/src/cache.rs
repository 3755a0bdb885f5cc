//! Stage cache guard
//!
//! Decides whether a stage's outputs already exist. Only `stat` and `list`
//! queries are issued; the guard never writes.
//!
//! A zero-byte artifact counts as missing: it is what an interrupted
//! transfer or a crashed tool leaves behind.

use seqflow_core::{PipelineError, RunDecision, StageDescriptor};
use seqflow_store::{ArtifactStore, Result};
use tracing::debug;

use crate::transfer::store_failure;

/// Decides whether a stage must run
///
/// # Arguments
/// * `descriptor` - Stage and its expected output patterns
/// * `store` - Store holding the outputs
/// * `container` - Container the output keys live in
pub async fn should_run(
    descriptor: &StageDescriptor,
    store: &dyn ArtifactStore,
    container: &str,
) -> Result<RunDecision> {
    if descriptor.force_recompute {
        debug!("{}: recompute forced", descriptor.name);
        return Ok(RunDecision::Run);
    }

    let missing = missing_outputs(descriptor, store, container).await?;
    if missing.is_empty() {
        debug!("{}: all outputs present, skipping", descriptor.name);
        Ok(RunDecision::Skip)
    } else {
        debug!("{}: missing outputs {:?}", descriptor.name, missing);
        Ok(RunDecision::Run)
    }
}

/// Decides whether a download stage must fetch its source again
///
/// On top of `should_run`, the local copy must match the size reported by
/// the source store. A source that has disappeared leaves a complete local
/// copy in place.
pub async fn should_fetch(
    descriptor: &StageDescriptor,
    workspace: &dyn ArtifactStore,
    workspace_container: &str,
    source_store: &dyn ArtifactStore,
) -> Result<RunDecision> {
    if should_run(descriptor, workspace, workspace_container).await? == RunDecision::Run {
        return Ok(RunDecision::Run);
    }

    let Some(source) = &descriptor.source else {
        return Ok(RunDecision::Skip);
    };

    let Some(remote) = source_store.stat(&source.container, &source.key).await? else {
        debug!("{}: source {} not found, keeping local copy", descriptor.name, source);
        return Ok(RunDecision::Skip);
    };

    for key in &descriptor.expected_outputs {
        let local = workspace.stat(workspace_container, key).await?;
        if local != Some(remote) {
            debug!(
                "{}: local {} has {:?} bytes, source has {}",
                descriptor.name, key, local, remote
            );
            return Ok(RunDecision::Run);
        }
    }

    Ok(RunDecision::Skip)
}

/// Confirms a finished stage left its outputs behind
///
/// Applies the same rule as `should_run`, ignoring `force_recompute`.
pub async fn verify_outputs(
    descriptor: &StageDescriptor,
    store: &dyn ArtifactStore,
    container: &str,
) -> std::result::Result<(), PipelineError> {
    let missing = missing_outputs(descriptor, store, container)
        .await
        .map_err(|e| store_failure(descriptor.name, "verify outputs", e, 1))?;

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::DataIntegrity(format!(
            "{} reported success but outputs are missing: {}",
            descriptor.name,
            missing.join(", ")
        )))
    }
}

/// Expected outputs that are missing or empty
///
/// A pattern containing `*` is satisfied by any non-empty key matching it.
pub async fn missing_outputs(
    descriptor: &StageDescriptor,
    store: &dyn ArtifactStore,
    container: &str,
) -> Result<Vec<String>> {
    let mut missing = Vec::new();

    for pattern in &descriptor.expected_outputs {
        let present = if pattern.contains('*') {
            any_match_non_empty(pattern, store, container).await?
        } else {
            matches!(store.stat(container, pattern).await?, Some(size) if size > 0)
        };

        if !present {
            missing.push(pattern.clone());
        }
    }

    Ok(missing)
}

async fn any_match_non_empty(
    pattern: &str,
    store: &dyn ArtifactStore,
    container: &str,
) -> Result<bool> {
    let prefix = pattern.split('*').next().unwrap_or_default();

    for key in store.list(container, prefix).await? {
        if !glob_match(pattern, &key) {
            continue;
        }
        if matches!(store.stat(container, &key).await?, Some(size) if size > 0) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Matches `key` against a pattern where `*` stands for any run of
/// characters, including none
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == key;
    };

    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqflow_core::{ArtifactRef, StageName};
    use seqflow_store::MemoryArtifactStore;

    const WS: &str = "workspace";

    fn descriptor(outputs: &[&str]) -> StageDescriptor {
        StageDescriptor::new(
            StageName::QualityCheck,
            outputs.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_skip_when_all_outputs_present() {
        let store = MemoryArtifactStore::new();
        store.insert(WS, "pl-S1/fastqc/stdin_fastqc.html", "<html>");

        let decision = should_run(&descriptor(&["pl-S1/fastqc/stdin_fastqc.html"]), &store, WS)
            .await
            .unwrap();
        assert_eq!(decision, RunDecision::Skip);
    }

    #[tokio::test]
    async fn test_run_when_any_output_missing() {
        let store = MemoryArtifactStore::new();
        store.insert(WS, "pl-S1/a.wig", "x");

        let decision = should_run(&descriptor(&["pl-S1/a.wig", "pl-S1/b.wig"]), &store, WS)
            .await
            .unwrap();
        assert_eq!(decision, RunDecision::Run);
    }

    #[tokio::test]
    async fn test_zero_byte_output_counts_as_missing() {
        let store = MemoryArtifactStore::new();
        store.insert(WS, "pl-S1/fastqc/stdin_fastqc.html", "");

        let decision = should_run(&descriptor(&["pl-S1/fastqc/stdin_fastqc.html"]), &store, WS)
            .await
            .unwrap();
        assert_eq!(decision, RunDecision::Run);
    }

    #[tokio::test]
    async fn test_force_recompute_always_runs() {
        let store = MemoryArtifactStore::new();
        store.insert(WS, "pl-S1/out", "data");

        let descriptor = descriptor(&["pl-S1/out"]).force_recompute(true);
        assert_eq!(
            should_run(&descriptor, &store, WS).await.unwrap(),
            RunDecision::Run
        );
        // Verification ignores the flag
        assert!(verify_outputs(&descriptor, &store, WS).await.is_ok());
    }

    #[tokio::test]
    async fn test_wildcard_needs_one_non_empty_match() {
        let store = MemoryArtifactStore::new();
        let descriptor = descriptor(&["pl-S1/fastqc/*_fastqc.zip"]);

        store.insert(WS, "pl-S1/fastqc/stdin_fastqc.zip", "");
        assert_eq!(
            should_run(&descriptor, &store, WS).await.unwrap(),
            RunDecision::Run
        );

        store.insert(WS, "pl-S1/fastqc/other_fastqc.zip", "zip");
        assert_eq!(
            should_run(&descriptor, &store, WS).await.unwrap(),
            RunDecision::Skip
        );
    }

    #[tokio::test]
    async fn test_should_fetch_compares_source_size() {
        let workspace = MemoryArtifactStore::new();
        let source = MemoryArtifactStore::new();
        source.insert("reads", "S1.fastq.gz", "full-content");
        workspace.insert(WS, "pl-S1/reads/S1.fastq.gz", "partial");

        let descriptor = StageDescriptor::new(
            StageName::Download,
            vec!["pl-S1/reads/S1.fastq.gz".to_string()],
        )
        .with_source(ArtifactRef::new("reads", "S1.fastq.gz"));

        assert_eq!(
            should_fetch(&descriptor, &workspace, WS, &source)
                .await
                .unwrap(),
            RunDecision::Run
        );

        workspace.insert(WS, "pl-S1/reads/S1.fastq.gz", "full-content");
        assert_eq!(
            should_fetch(&descriptor, &workspace, WS, &source)
                .await
                .unwrap(),
            RunDecision::Skip
        );
    }

    #[tokio::test]
    async fn test_verify_outputs_reports_missing() {
        let store = MemoryArtifactStore::new();
        let err = verify_outputs(&descriptor(&["pl-S1/missing"]), &store, WS)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(ref m) if m.contains("pl-S1/missing")));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("a/*.wig", "a/x.wig"));
        assert!(glob_match("a/*.wig", "a/.wig"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a/*/b*", "a/x/y/bz"));
        assert!(!glob_match("a/*.wig", "a/x.bw"));
        assert!(!glob_match("a/*.wig", "b/x.wig"));
        assert!(!glob_match("ab*ba", "aba"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }
}
