//! Wiring of stores, runner and orchestrator

use anyhow::{Context, Result};
use seqflow_core::PipelineError;
use seqflow_orchestrator::Orchestrator;
use seqflow_runner::{LocalTaskRunner, ToolExecutor};
use seqflow_store::{ArtifactStore, FsArtifactStore, HttpArtifactStore};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Remote blob store holding reads and results
pub fn remote_store(config: &Config) -> Arc<dyn ArtifactStore> {
    Arc::new(HttpArtifactStore::new(&config.store_url, &config.credential))
}

/// Lists the read files available in the reads container
pub async fn list_reads(remote: &dyn ArtifactStore, config: &Config) -> Result<Vec<String>> {
    let container = &config.orchestrator.reads_container;
    remote
        .list(container, "")
        .await
        .with_context(|| format!("failed to list reads container '{}'", container))
}

/// Builds an orchestrator backed by the local worker pool
///
/// Fails when reference data the tools need is missing from the workspace.
/// Seeds the shared chromosome sizes table before any sample runs.
pub async fn orchestrator(
    config: &Config,
    remote: Arc<dyn ArtifactStore>,
    force_recompute: bool,
) -> Result<Arc<Orchestrator>> {
    let workspace: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&config.runner.data_dir));

    let executor = Arc::new(ToolExecutor::new(workspace.clone(), config.runner.clone()));
    let missing = executor
        .missing_references()
        .await
        .context("failed to check reference data")?;
    if !missing.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "reference data missing from workspace: {}",
            missing.join(", ")
        ))
        .into());
    }
    executor
        .seed_chrom_sizes()
        .await
        .context("failed to write chromosome sizes")?;

    let runner = Arc::new(LocalTaskRunner::new(executor, &config.runner));
    info!(
        "Using data volume {} with up to {} parallel task(s)",
        config.runner.data_dir.display(),
        config.runner.max_parallel_tasks
    );

    Ok(Arc::new(Orchestrator::new(
        runner,
        workspace,
        remote,
        config
            .orchestrator
            .clone()
            .with_force_recompute(force_recompute || config.orchestrator.force_recompute),
    )))
}
