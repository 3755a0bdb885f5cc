//! Outcome rendering shared by the command handlers

use colored::*;
use seqflow_core::{OutcomeStatus, PipelineOutcome, StageName, StageStatus};
use std::process::ExitCode;

pub fn any_failed(outcomes: &[PipelineOutcome]) -> bool {
    outcomes.iter().any(PipelineOutcome::is_failed)
}

/// Exit code for a batch: failure when any outcome failed
pub fn exit_code(outcomes: &[PipelineOutcome]) -> ExitCode {
    if any_failed(outcomes) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Print one line per sample followed by per-stage detail and totals
pub fn print_outcomes(outcomes: &[PipelineOutcome]) {
    if outcomes.is_empty() {
        println!("{}", "No samples found.".yellow());
        return;
    }

    println!("{}", format!("Processed {} sample(s):", outcomes.len()).bold());
    println!();

    for outcome in outcomes {
        print_outcome(outcome);
    }

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    let skipped = outcomes.len() - completed - failed;

    println!("{}", "─".repeat(60).dimmed());
    println!(
        "{} completed, {} failed, {} skipped",
        completed.to_string().green(),
        failed.to_string().red(),
        skipped.to_string().yellow()
    );
}

fn print_outcome(outcome: &PipelineOutcome) {
    let elapsed = outcome
        .finished_at
        .signed_duration_since(outcome.started_at)
        .num_seconds();

    println!(
        "  {} {} {} {}",
        "▸".cyan(),
        outcome.sample_name.bold(),
        format!("({})", outcome.pipeline_id).dimmed(),
        colorize_status(&outcome.status)
    );

    match &outcome.status {
        OutcomeStatus::Failed {
            phase,
            stage,
            reason,
        } => {
            println!("    Failed in: {} ({})", phase, stage);
            println!("    Reason:    {}", reason.red());
        }
        OutcomeStatus::Skipped { reason } => {
            println!("    Reason:    {}", reason.dimmed());
            println!();
            return;
        }
        OutcomeStatus::Completed => {}
    }

    for stage in StageName::ALL {
        println!(
            "    {:<14} {}",
            stage.as_str(),
            colorize_stage(outcome.stage_status(stage))
        );
    }
    println!("    Duration:  {}s", elapsed);
    println!();
}

/// Colorize an outcome status for display
pub fn colorize_status(status: &OutcomeStatus) -> ColoredString {
    match status {
        OutcomeStatus::Completed => "completed".green(),
        OutcomeStatus::Failed { .. } => "failed".red(),
        OutcomeStatus::Skipped { .. } => "skipped".yellow(),
    }
}

/// Colorize a stage status for display
pub fn colorize_stage(status: &StageStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        StageStatus::Completed => text.green(),
        StageStatus::Skipped => text.cyan(),
        StageStatus::NotRun | StageStatus::Cancelled => text.dimmed(),
        StageStatus::Failed(_) => text.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_reflects_failures() {
        let skipped = PipelineOutcome::skipped("S2", "beyond batch limit");
        let rejected = PipelineOutcome::rejected("S3", "paired-end sample S3 has 1 member(s)");

        assert!(!any_failed(&[]));
        assert!(!any_failed(&[skipped.clone()]));
        assert!(any_failed(&[skipped, rejected]));
    }
}
