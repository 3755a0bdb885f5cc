//! Seqflow CLI
//!
//! Command-line entry point for the sequencing pipeline: batch runs over the
//! reads container, single-stage debug runs and grouping previews.

mod commands;
mod config;
mod services;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "seqflow")]
#[command(about = "RNA-seq pipeline orchestrator", long_about = None)]
struct Cli {
    /// Remote blob store URL (overrides SEQFLOW_STORE_URL)
    #[arg(long, env = "SEQFLOW_STORE_URL")]
    store_url: Option<String>,

    /// Shared data volume root (overrides SEQFLOW_DATA_DIR)
    #[arg(long, env = "SEQFLOW_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so `batch --json` output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seqflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("configuration error")?;
    if let Some(store_url) = cli.store_url {
        config.store_url = store_url;
    }
    if let Some(data_dir) = cli.data_dir {
        config.runner.data_dir = data_dir;
    }
    config.validate().context("configuration error")?;

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqflow_core::StageName;

    #[test]
    fn test_parse_batch_flags() {
        let cli = Cli::try_parse_from([
            "seqflow",
            "batch",
            "--no-cache",
            "--limit",
            "2",
            "--sample",
            "S1",
            "--sample",
            "S2",
        ])
        .unwrap();

        match cli.command {
            Commands::Batch {
                no_cache,
                limit,
                samples,
                json,
            } => {
                assert!(no_cache);
                assert_eq!(limit, Some(2));
                assert_eq!(samples, vec!["S1", "S2"]);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_stage_command() {
        let cli = Cli::try_parse_from([
            "seqflow",
            "stage",
            "trimming",
            "--sample",
            "S1",
            "--read",
            "S1_1.fastq.gz",
            "--read",
            "S1_2.fastq.gz",
        ])
        .unwrap();

        match cli.command {
            Commands::Stage {
                stage,
                sample,
                reads,
                force,
            } => {
                assert_eq!(stage, StageName::Trimming);
                assert_eq!(sample, "S1");
                assert_eq!(reads.len(), 2);
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_stage_requires_known_name_and_reads() {
        assert!(
            Cli::try_parse_from(["seqflow", "stage", "fastqc", "--sample", "S1", "--read", "a"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["seqflow", "stage", "trimming", "--sample", "S1"]).is_err());
    }
}
