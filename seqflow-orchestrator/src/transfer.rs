//! Artifact transfers between the remote store and the workspace
//!
//! Every store call is retried on transient errors. Downloads are checked
//! against the size the source reports and fetched once more on mismatch.

use seqflow_core::{ArtifactRef, PipelineError, SampleLayout, StageName};
use seqflow_runner::RetryPolicy;
use seqflow_store::{ArtifactStore, StoreError};
use tracing::{debug, info, warn};

/// Attempts per file before a size mismatch fails the download
const SIZE_CHECK_ATTEMPTS: usize = 2;

/// Store calls shared by the transfer functions
pub struct Transfers<'a> {
    pub workspace: &'a dyn ArtifactStore,
    pub workspace_container: &'a str,
    pub remote: &'a dyn ArtifactStore,
    pub retry: RetryPolicy,
}

/// Result of uploading a sample's workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
}

impl Transfers<'_> {
    /// Copies one source blob into the workspace
    ///
    /// # Returns
    /// Number of bytes written
    pub async fn download(
        &self,
        source: &ArtifactRef,
        local_key: &str,
    ) -> Result<u64, PipelineError> {
        let stage = StageName::Download;
        let mut last_mismatch = String::new();

        for attempt in 1..=SIZE_CHECK_ATTEMPTS {
            let expected = self
                .retried(stage, "stat source", || {
                    self.remote.stat(&source.container, &source.key)
                })
                .await?
                .ok_or_else(|| {
                    PipelineError::stage(stage, format!("source {} not found", source))
                })?;

            let data = self
                .retried(stage, "fetch source", || {
                    self.remote.get(&source.container, &source.key)
                })
                .await?;
            let fetched = data.len() as u64;

            self.retried(stage, "write read", || {
                self.workspace
                    .put(self.workspace_container, local_key, data.clone())
            })
            .await?;

            let written = self
                .retried(stage, "stat read", || {
                    self.workspace.stat(self.workspace_container, local_key)
                })
                .await?;

            if fetched == expected && written == Some(expected) {
                info!("Downloaded {} ({} bytes) to {}", source, expected, local_key);
                return Ok(expected);
            }

            last_mismatch = format!(
                "size-mismatch for {}: source reports {} bytes, fetched {}, wrote {:?}",
                source, expected, fetched, written
            );
            warn!("{} (attempt {}/{})", last_mismatch, attempt, SIZE_CHECK_ATTEMPTS);

            self.retried(stage, "discard partial read", || {
                self.workspace.delete(self.workspace_container, local_key)
            })
            .await?;
        }

        Err(PipelineError::DataIntegrity(last_mismatch))
    }

    /// Uploads every artifact under the sample's prefix to the results
    /// container, keyed `<pipeline id>/<relative path>`
    ///
    /// Artifacts whose remote copy already has the local size are skipped.
    /// Every file is attempted; any failure fails the upload.
    pub async fn upload(
        &self,
        layout: &SampleLayout,
        results_container: &str,
    ) -> Result<UploadSummary, PipelineError> {
        let stage = StageName::Upload;
        let prefix = layout.prefix();

        let keys = self
            .retried(stage, "list workspace", || {
                self.workspace.list(self.workspace_container, &prefix)
            })
            .await?;

        let mut summary = UploadSummary::default();
        let mut failures = Vec::new();

        for key in keys {
            let Some(relative) = layout.relative(&key) else {
                continue;
            };
            let remote_key = format!("{}/{}", layout.pipeline_id(), relative);

            match self.upload_one(&key, results_container, &remote_key).await {
                Ok(true) => summary.uploaded += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!("Failed to upload {}: {}", key, e);
                    failures.push(format!("{}: {}", key, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(PipelineError::stage(
                stage,
                format!(
                    "{} file(s) failed to upload: {}",
                    failures.len(),
                    failures.join("; ")
                ),
            ));
        }

        info!(
            "Uploaded {} artifact(s) for {} ({} already present)",
            summary.uploaded,
            layout.pipeline_id(),
            summary.skipped
        );
        Ok(summary)
    }

    /// Uploads one artifact; returns false when it was skipped
    async fn upload_one(
        &self,
        key: &str,
        results_container: &str,
        remote_key: &str,
    ) -> Result<bool, PipelineError> {
        let stage = StageName::Upload;

        let local = self
            .retried(stage, "stat artifact", || {
                self.workspace.stat(self.workspace_container, key)
            })
            .await?;
        let Some(local) = local else {
            return Ok(false);
        };

        let remote = self
            .retried(stage, "stat remote", || {
                self.remote.stat(results_container, remote_key)
            })
            .await?;

        if remote == Some(local) {
            debug!("Skipping {}: remote already has {} bytes", key, local);
            return Ok(false);
        }

        let data = self
            .retried(stage, "read artifact", || {
                self.workspace.get(self.workspace_container, key)
            })
            .await?;

        self.retried(stage, "upload artifact", || {
            self.remote.put(results_container, remote_key, data.clone())
        })
        .await?;

        debug!("Uploaded {} to {}/{}", key, results_container, remote_key);
        Ok(true)
    }

    async fn retried<T, F, Fut>(
        &self,
        stage: StageName,
        what: &str,
        op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = seqflow_store::Result<T>>,
    {
        self.retry
            .run(what, op, StoreError::is_transient)
            .await
            .map_err(|(e, attempts)| store_failure(stage, what, e, attempts))
    }
}

pub(crate) fn store_failure(
    stage: StageName,
    what: &str,
    e: StoreError,
    attempts: usize,
) -> PipelineError {
    if e.is_transient() {
        PipelineError::Transient {
            stage,
            attempts,
            message: format!("{}: {}", what, e),
        }
    } else {
        PipelineError::stage(stage, format!("{}: {}", what, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seqflow_core::PipelineId;
    use seqflow_store::MemoryArtifactStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WS: &str = "workspace";

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    /// Source store that truncates the first `short_reads` fetches
    struct TruncatingStore {
        inner: MemoryArtifactStore,
        short_reads: usize,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactStore for TruncatingStore {
        async fn get(&self, container: &str, key: &str) -> seqflow_store::Result<Vec<u8>> {
            let mut data = self.inner.get(container, key).await?;
            if self.gets.fetch_add(1, Ordering::SeqCst) < self.short_reads {
                data.truncate(data.len() / 2);
            }
            Ok(data)
        }

        async fn put(&self, container: &str, key: &str, data: Vec<u8>) -> seqflow_store::Result<()> {
            self.inner.put(container, key, data).await
        }

        async fn stat(&self, container: &str, key: &str) -> seqflow_store::Result<Option<u64>> {
            self.inner.stat(container, key).await
        }

        async fn list(&self, container: &str, prefix: &str) -> seqflow_store::Result<Vec<String>> {
            self.inner.list(container, prefix).await
        }

        async fn delete(&self, container: &str, key: &str) -> seqflow_store::Result<()> {
            self.inner.delete(container, key).await
        }
    }

    fn truncating(short_reads: usize) -> TruncatingStore {
        let inner = MemoryArtifactStore::new();
        inner.insert("reads", "S1.fastq.gz", "@r1\nACGT\n+\nIIII\n");
        TruncatingStore {
            inner,
            short_reads,
            gets: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_download_refetches_once_on_size_mismatch() {
        let workspace = MemoryArtifactStore::new();
        let remote = truncating(1);
        let transfers = Transfers {
            workspace: &workspace,
            workspace_container: WS,
            remote: &remote,
            retry: retry(),
        };

        let size = transfers
            .download(
                &ArtifactRef::new("reads", "S1.fastq.gz"),
                "pl-S1/reads/S1.fastq.gz",
            )
            .await
            .unwrap();

        assert_eq!(size, 16);
        assert_eq!(remote.gets.load(Ordering::SeqCst), 2);
        assert_eq!(
            workspace.stat(WS, "pl-S1/reads/S1.fastq.gz").await.unwrap(),
            Some(16)
        );
    }

    #[tokio::test]
    async fn test_download_fails_after_second_mismatch() {
        let workspace = MemoryArtifactStore::new();
        let remote = truncating(2);
        let transfers = Transfers {
            workspace: &workspace,
            workspace_container: WS,
            remote: &remote,
            retry: retry(),
        };

        let err = transfers
            .download(
                &ArtifactRef::new("reads", "S1.fastq.gz"),
                "pl-S1/reads/S1.fastq.gz",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::DataIntegrity(ref m) if m.starts_with("size-mismatch")));
        // The partial copy is not left behind
        assert_eq!(workspace.stat(WS, "pl-S1/reads/S1.fastq.gz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_download_missing_source() {
        let workspace = MemoryArtifactStore::new();
        let remote = MemoryArtifactStore::new();
        let transfers = Transfers {
            workspace: &workspace,
            workspace_container: WS,
            remote: &remote,
            retry: retry(),
        };

        let err = transfers
            .download(&ArtifactRef::new("reads", "nope.fastq.gz"), "pl-nope/reads/x")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Stage { stage: StageName::Download, .. }));
    }

    #[tokio::test]
    async fn test_upload_skips_files_with_equal_remote_size() {
        let workspace = MemoryArtifactStore::new();
        let remote = MemoryArtifactStore::new();
        workspace.insert(WS, "pl-S1/fastqc/stdin_fastqc.html", "<html>");
        workspace.insert(WS, "pl-S1/staralign/Signal.Unique.str1.out.bw", "bigwig");
        workspace.insert(WS, "pl-S10/other", "not mine");
        remote.insert("results", "pl-S1/fastqc/stdin_fastqc.html", "<HTML>");

        let transfers = Transfers {
            workspace: &workspace,
            workspace_container: WS,
            remote: &remote,
            retry: retry(),
        };
        let layout = SampleLayout::new(PipelineId::for_sample("S1"));

        let summary = transfers.upload(&layout, "results").await.unwrap();
        assert_eq!(
            summary,
            UploadSummary {
                uploaded: 1,
                skipped: 1
            }
        );
        assert_eq!(
            remote
                .get("results", "pl-S1/staralign/Signal.Unique.str1.out.bw")
                .await
                .unwrap(),
            b"bigwig".to_vec()
        );
        assert!(remote.stat("results", "pl-S10/other").await.unwrap().is_none());
    }
}
