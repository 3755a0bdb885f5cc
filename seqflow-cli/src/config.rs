//! Configuration module
//!
//! Collects the remote store settings together with the runner and
//! orchestrator configurations, all read from `SEQFLOW_*` variables.

use anyhow::{Context, Result};

/// Remote store used when `SEQFLOW_STORE_URL` is unset (local emulator)
pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote blob store
    pub store_url: String,

    /// Bearer credential for the remote blob store
    pub credential: String,

    pub runner: seqflow_runner::Config,
    pub orchestrator: seqflow_orchestrator::Config,
}

impl Config {
    /// Loads configuration from the environment
    ///
    /// `SEQFLOW_STORE_CREDENTIAL` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let credential = lookup("SEQFLOW_STORE_CREDENTIAL")
            .filter(|value| !value.trim().is_empty())
            .context("SEQFLOW_STORE_CREDENTIAL must be set to the remote store credential")?;

        let orchestrator = seqflow_orchestrator::Config::from_lookup(&lookup)
            .context("invalid orchestrator settings")?;

        Ok(Self {
            store_url: lookup("SEQFLOW_STORE_URL").unwrap_or_else(|| DEFAULT_STORE_URL.to_string()),
            credential,
            runner: seqflow_runner::Config::from_lookup(&lookup),
            orchestrator,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.store_url.starts_with("http://") && !self.store_url.starts_with("https://") {
            anyhow::bail!("SEQFLOW_STORE_URL must be an http(s) URL, got '{}'", self.store_url);
        }

        self.runner
            .validate()
            .context("invalid runner configuration")?;
        self.orchestrator
            .validate()
            .context("invalid orchestrator configuration")?;

        if self.runner.workspace_container != self.orchestrator.workspace_container {
            anyhow::bail!(
                "runner and orchestrator disagree on the workspace container ('{}' vs '{}')",
                self.runner.workspace_container,
                self.orchestrator.workspace_container
            );
        }

        Ok(())
    }
}
