//! In-memory artifact store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StoreError};
use crate::{ArtifactStore, validate_key};

/// Artifact store held entirely in memory
///
/// Used by tests.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an artifact without going through the async interface
    pub fn insert(&self, container: &str, key: &str, data: impl Into<Vec<u8>>) {
        let mut blobs = self.blobs();
        blobs.insert((container.to_string(), key.to_string()), data.into());
    }

    /// Number of artifacts across all containers
    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn blobs(&self) -> MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs();
        blobs
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", container, key)))
    }

    async fn put(&self, container: &str, key: &str, data: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.insert(container, key, data);
        Ok(())
    }

    async fn stat(&self, container: &str, key: &str) -> Result<Option<u64>> {
        let blobs = self.blobs();
        Ok(blobs
            .get(&(container.to_string(), key.to_string()))
            .map(|data| data.len() as u64))
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let blobs = self.blobs();
        Ok(blobs
            .keys()
            .filter(|(c, k)| c == container && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn delete(&self, container: &str, key: &str) -> Result<()> {
        let mut blobs = self.blobs();
        blobs.remove(&(container.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_listing() {
        let store = MemoryArtifactStore::new();
        store.insert("reads", "S1_1.fastq.gz", "abc");
        store.insert("reads", "S1_2.fastq.gz", "abcd");
        store.insert("results", "pl-S1/x", "z");

        assert_eq!(store.stat("reads", "S1_2.fastq.gz").await.unwrap(), Some(4));
        assert_eq!(store.stat("reads", "missing").await.unwrap(), None);
        assert_eq!(
            store.list("reads", "").await.unwrap(),
            vec!["S1_1.fastq.gz", "S1_2.fastq.gz"]
        );

        store.delete("reads", "S1_1.fastq.gz").await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("reads", "S1_1.fastq.gz").await.is_err());
    }
}
