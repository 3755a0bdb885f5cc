//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod batch;
mod plan;
mod report;
mod stage;

use anyhow::Result;
use clap::Subcommand;
use seqflow_core::StageName;
use std::process::ExitCode;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the pipeline for every sample in the reads container
    Batch {
        /// Recompute every stage even when its outputs exist
        #[arg(long)]
        no_cache: bool,

        /// Run at most this many samples
        #[arg(long)]
        limit: Option<usize>,

        /// Only run these samples (repeatable)
        #[arg(long = "sample")]
        samples: Vec<String>,

        /// Print outcomes as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Run a single stage for one sample
    Stage {
        /// Stage to run (download, quality-check, strandedness, trimming,
        /// alignment, conversion, upload)
        stage: StageName,

        /// Sample name
        #[arg(long)]
        sample: String,

        /// Read file name; give twice for paired-end samples
        #[arg(long = "read", required = true)]
        reads: Vec<String>,

        /// Run even when the stage's outputs exist
        #[arg(long)]
        force: bool,
    },
    /// Show how the reads container groups into samples, without running
    Plan {
        /// Only show these samples (repeatable)
        #[arg(long = "sample")]
        samples: Vec<String>,

        /// Mark samples beyond this count as deferred
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
///
/// # Returns
/// Process exit code: failure when any sample or stage failed
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Batch {
            no_cache,
            limit,
            samples,
            json,
        } => batch::handle_batch(config, no_cache, limit, samples, json).await,
        Commands::Stage {
            stage,
            sample,
            reads,
            force,
        } => stage::handle_stage(config, stage, sample, reads, force).await,
        Commands::Plan { samples, limit } => plan::handle_plan(config, samples, limit).await,
    }
}
