//! Filesystem artifact store
//!
//! Artifacts live at `<root>/<container>/<key>`. Writes go to a temporary
//! sibling file first and are renamed into place, so a reader never sees a
//! half-written artifact under its final key.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::{ArtifactStore, validate_key};

const TMP_SUFFIX: &str = ".seqflow-tmp";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Artifact store backed by a local or mounted directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, container: &str, key: &str) -> Result<PathBuf> {
        validate_key(container)?;
        validate_key(key)?;
        Ok(self.root.join(container).join(key))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.path_of(container, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{}/{}", container, key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, container: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_of(container, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Unique per writer: shared reference files may be written by
        // several samples at once.
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(
            ".{}-{}{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TMP_SUFFIX
        ));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn stat(&self, container: &str, key: &str) -> Result<Option<u64>> {
        let path = self.path_of(container, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        validate_key(container)?;
        let base = self.root.join(container);

        let mut keys = Vec::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.ends_with(TMP_SUFFIX) {
                    continue;
                }
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, container: &str, key: &str) -> Result<()> {
        let path = self.path_of(container, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn local_path(&self, container: &str, key: &str) -> Option<PathBuf> {
        self.path_of(container, key).ok()
    }
}
