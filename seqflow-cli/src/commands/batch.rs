//! Batch command handler
//!
//! Lists the reads container, dispatches every sample and reports the
//! outcomes.

use anyhow::{Context, Result};
use seqflow_orchestrator::{DispatchOptions, dispatch};
use std::process::ExitCode;
use tracing::info;

use super::report::{exit_code, print_outcomes};
use crate::config::Config;
use crate::services;

/// Run the pipeline over the reads container
///
/// # Arguments
/// * `config` - The CLI configuration
/// * `no_cache` - Recompute every stage
/// * `limit` - Max samples to run
/// * `samples` - Sample filter; empty runs all
/// * `json` - Print outcomes as JSON
pub async fn handle_batch(
    config: &Config,
    no_cache: bool,
    limit: Option<usize>,
    samples: Vec<String>,
    json: bool,
) -> Result<ExitCode> {
    let remote = services::remote_store(config);
    let orchestrator = services::orchestrator(config, remote.clone(), no_cache).await?;
    let files = services::list_reads(remote.as_ref(), config).await?;
    info!("Found {} file(s) in the reads container", files.len());

    let options = DispatchOptions { limit, samples };
    let outcomes = dispatch(orchestrator, &files, &options).await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&outcomes).context("failed to serialize outcomes")?;
        println!("{}", rendered);
    } else {
        print_outcomes(&outcomes);
    }

    Ok(exit_code(&outcomes))
}
