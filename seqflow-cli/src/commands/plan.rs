//! Plan command handler
//!
//! Prints how the reads container groups into samples, without running
//! anything.

use anyhow::Result;
use colored::*;
use seqflow_orchestrator::{DispatchOptions, Plan};
use std::process::ExitCode;

use crate::config::Config;
use crate::services;

/// Print the grouping of the reads container
pub async fn handle_plan(
    config: &Config,
    samples: Vec<String>,
    limit: Option<usize>,
) -> Result<ExitCode> {
    let remote = services::remote_store(config);
    let files = services::list_reads(remote.as_ref(), config).await?;

    let options = DispatchOptions { limit, samples };
    let plan = Plan::new(&files, &config.orchestrator.read_suffix, &options);
    print_plan(&plan);

    if plan.rejected.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No read files found.".yellow());
        return;
    }

    println!("{}", format!("{} sample(s) to run:", plan.runnable.len()).bold());
    for spec in &plan.runnable {
        println!(
            "  {} {} {} {}",
            "▸".cyan(),
            spec.sample_name().bold(),
            if spec.is_paired() {
                "paired-end".normal()
            } else {
                "single-end".normal()
            },
            format!("({})", spec.pipeline_id()).dimmed()
        );
        for file in spec.read_files() {
            println!("      {}", file.dimmed());
        }
    }

    if !plan.deferred.is_empty() {
        println!();
        println!("{}", format!("{} sample(s) beyond the limit:", plan.deferred.len()).yellow());
        for spec in &plan.deferred {
            println!("  {} {}", "▸".dimmed(), spec.sample_name());
        }
    }

    if !plan.rejected.is_empty() {
        println!();
        println!("{}", format!("{} invalid group(s):", plan.rejected.len()).red());
        for (name, e) in &plan.rejected {
            println!("  {} {}: {}", "✗".red(), name.bold(), e);
        }
    }
}
