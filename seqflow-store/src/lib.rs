//! Seqflow Artifact Store
//!
//! Blob storage addressed by container and key. Three backends share one
//! trait:
//! - `FsArtifactStore`: the shared data volume the tools read and write
//! - `HttpArtifactStore`: remote object storage holding raw reads and results
//! - `MemoryArtifactStore`: in-process store for tests
//!
//! Stores are shared across every component and sample as
//! `Arc<dyn ArtifactStore>`. They need no locking beyond what the backend
//! provides because each sample writes under its own pipeline ID prefix.
//!
//! # Example
//!
//! ```no_run
//! use seqflow_store::{ArtifactStore, FsArtifactStore};
//!
//! # async fn example() -> seqflow_store::Result<()> {
//! let store = FsArtifactStore::new("/data");
//! store.put("workspace", "pl-S1/reads/S1.fastq.gz", b"@r1".to_vec()).await?;
//! assert_eq!(store.stat("workspace", "pl-S1/reads/S1.fastq.gz").await?, Some(3));
//! # Ok(())
//! # }
//! ```

pub mod error;
mod fs;
mod http;
mod memory;

pub use error::{Result, StoreError};
pub use fs::FsArtifactStore;
pub use http::HttpArtifactStore;
pub use memory::MemoryArtifactStore;

use async_trait::async_trait;
use std::path::PathBuf;

/// Blob store interface used by every seqflow component
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Reads an artifact's bytes
    ///
    /// Returns `StoreError::NotFound` when the artifact does not exist.
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>>;

    /// Writes an artifact, replacing any previous content
    async fn put(&self, container: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// Size of an artifact in bytes, or `None` if it does not exist
    async fn stat(&self, container: &str, key: &str) -> Result<Option<u64>>;

    /// Keys in a container starting with `prefix`, sorted
    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>>;

    /// Removes an artifact; removing a missing artifact is not an error
    async fn delete(&self, container: &str, key: &str) -> Result<()>;

    /// Filesystem path of an artifact, for backends that have one
    ///
    /// External tools need real paths; only the filesystem backend
    /// provides them.
    fn local_path(&self, _container: &str, _key: &str) -> Option<PathBuf> {
        None
    }
}

/// Rejects keys that are empty, absolute or climb out of their container
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part == ".." || part == ".")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("pl-S1/reads/S1.fastq.gz").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("pl-S1/../pl-S2/reads").is_err());
    }
}
