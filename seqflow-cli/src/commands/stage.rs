//! Stage command handler
//!
//! Runs one stage for one sample, for debugging a stage in isolation.

use anyhow::{Context, Result};
use colored::*;
use seqflow_core::{SampleSpec, StageName};
use std::process::ExitCode;

use super::report::colorize_stage;
use crate::config::Config;
use crate::services;

/// Run a single stage
///
/// # Arguments
/// * `config` - The CLI configuration
/// * `stage` - Stage to run
/// * `sample` - Sample name
/// * `reads` - The sample's read file names
/// * `force` - Run even when outputs exist
pub async fn handle_stage(
    config: &Config,
    stage: StageName,
    sample: String,
    reads: Vec<String>,
    force: bool,
) -> Result<ExitCode> {
    let spec = SampleSpec::new(sample, reads).context("invalid sample")?;
    let orchestrator = services::orchestrator(config, services::remote_store(config), false).await?;

    println!(
        "{} {} for {}",
        "Running".bold(),
        stage.as_str().cyan(),
        spec.pipeline_id().to_string().dimmed()
    );

    match orchestrator.run_stage(&spec, stage, force).await {
        Ok(status) => {
            println!("  {} {}", "✓".green(), colorize_stage(&status));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e.to_string().red());
            Ok(ExitCode::FAILURE)
        }
    }
}
