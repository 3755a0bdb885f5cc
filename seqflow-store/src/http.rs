//! HTTP object store client
//!
//! Talks to an object store exposing blobs at `<base>/<container>/<key>`:
//! - `GET` reads a blob, `PUT` writes it, `DELETE` removes it
//! - `HEAD` reports its size through `Content-Length`
//! - `GET <base>/<container>?prefix=<p>` lists keys as a JSON array
//!
//! Every request carries the store credential as a bearer token.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::{ArtifactStore, validate_key};

/// Artifact store backed by a remote HTTP object store
#[derive(Clone)]
pub struct HttpArtifactStore {
    /// Base URL of the store (e.g., "https://blobs.example.org")
    base_url: String,
    /// Bearer credential
    credential: String,
    /// HTTP client instance
    client: Client,
}

impl std::fmt::Debug for HttpArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArtifactStore")
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl HttpArtifactStore {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the object store
    /// * `credential` - Bearer credential sent with every request
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self::with_client(base_url, credential, Client::new())
    }

    /// Create a new store client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        credential: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.into(),
            client,
        }
    }

    /// Get the base URL of the store
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn blob_url(&self, container: &str, key: &str) -> Result<String> {
        validate_key(container)?;
        validate_key(key)?;
        Ok(format!("{}/{}/{}", self.base_url, container, key))
    }

    /// Check the status code and turn failures into `StoreError`
    async fn check_response(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.blob_url(container, key)?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .send()
            .await?;

        let response = self
            .check_response(response, &format!("{}/{}", container, key))
            .await?;
        let bytes = response.bytes().await?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn put(&self, container: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let url = self.blob_url(container, key)?;
        let size = data.len();
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.credential)
            .body(data)
            .send()
            .await?;

        self.check_response(response, &format!("{}/{}", container, key))
            .await?;

        debug!("Uploaded {} bytes to {}", size, url);
        Ok(())
    }

    async fn stat(&self, container: &str, key: &str) -> Result<Option<u64>> {
        let url = self.blob_url(container, key)?;
        let response = self
            .client
            .head(&url)
            .bearer_auth(&self.credential)
            .send()
            .await?;

        let response = match self
            .check_response(response, &format!("{}/{}", container, key))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let size = content_length(response.headers()).ok_or_else(|| {
            StoreError::ParseError(format!("missing Content-Length for {}", url))
        })?;

        Ok(Some(size))
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        validate_key(container)?;
        let url = format!("{}/{}", self.base_url, container);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .query(&[("prefix", prefix)])
            .send()
            .await?;

        let response = self.check_response(response, container).await?;
        let mut keys: Vec<String> = response
            .json()
            .await
            .map_err(|e| StoreError::ParseError(format!("Failed to parse listing: {}", e)))?;

        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, container: &str, key: &str) -> Result<()> {
        let url = self.blob_url(container, key)?;
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.credential)
            .send()
            .await?;

        match self
            .check_response(response, &format!("{}/{}", container, key))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn content_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
}
