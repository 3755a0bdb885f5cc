//! Batch dispatcher
//!
//! Groups a listing of read files into samples and runs the pipeline for
//! each one concurrently, bounded by `max_parallel_samples`. Invalid groups
//! and panicking sample tasks are reported as failed outcomes rather than
//! dropped.

use seqflow_core::{PipelineError, PipelineOutcome, SampleSpec, group_samples, validate_groups};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::pipeline::Orchestrator;

/// Which samples of a listing to run
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Run at most this many valid samples; the rest are reported skipped
    pub limit: Option<usize>,

    /// Only consider these sample names; empty means all
    pub samples: Vec<String>,
}

/// What a dispatch would do with a listing
#[derive(Debug, Default)]
pub struct Plan {
    pub runnable: Vec<SampleSpec>,
    pub rejected: Vec<(String, PipelineError)>,
    /// Valid samples beyond the limit
    pub deferred: Vec<SampleSpec>,
}

impl Plan {
    /// Groups and validates a listing without running anything
    ///
    /// # Arguments
    /// * `files` - Flat listing of the reads container
    /// * `suffix` - Suffix identifying read files
    /// * `options` - Sample filter and limit
    pub fn new<S: AsRef<str>>(files: &[S], suffix: &str, options: &DispatchOptions) -> Self {
        let mut groups = group_samples(files, suffix);
        if !options.samples.is_empty() {
            groups.retain(|name, _| options.samples.contains(name));
        }

        let (mut runnable, rejected) = validate_groups(&groups);
        let deferred = match options.limit {
            Some(limit) if runnable.len() > limit => runnable.split_off(limit),
            _ => Vec::new(),
        };

        Self {
            runnable,
            rejected,
            deferred,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty() && self.rejected.is_empty() && self.deferred.is_empty()
    }
}

/// Runs every sample in the listing
///
/// # Returns
/// One outcome per sample group, sorted by sample name
pub async fn dispatch<S: AsRef<str>>(
    orchestrator: Arc<Orchestrator>,
    files: &[S],
    options: &DispatchOptions,
) -> Vec<PipelineOutcome> {
    let config = orchestrator.config();
    let plan = Plan::new(files, &config.read_suffix, options);
    info!(
        "Dispatching {} sample(s), {} rejected, {} beyond limit",
        plan.runnable.len(),
        plan.rejected.len(),
        plan.deferred.len()
    );

    let mut outcomes = Vec::new();

    for (name, e) in plan.rejected {
        warn!("Rejecting sample {}: {}", name, e);
        outcomes.push(PipelineOutcome::rejected(&name, e.to_string()));
    }

    for spec in plan.deferred {
        outcomes.push(PipelineOutcome::skipped(
            spec.sample_name(),
            "beyond batch limit",
        ));
    }

    let semaphore = Arc::new(Semaphore::new(config.max_parallel_samples));
    let mut handles = Vec::new();

    for spec in plan.runnable {
        let orchestrator = orchestrator.clone();
        let semaphore = semaphore.clone();
        let name = spec.sample_name().to_string();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return PipelineOutcome::rejected(
                        spec.sample_name(),
                        format!("sample pool closed: {}", e),
                    );
                }
            };
            orchestrator.run(&spec).await
        });
        handles.push((name, handle));
    }

    for (name, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!("Sample task for {} did not finish: {}", name, e);
                outcomes.push(PipelineOutcome::rejected(
                    &name,
                    format!("sample task aborted: {}", e),
                ));
            }
        }
    }

    outcomes.sort_by(|a, b| a.sample_name.cmp(&b.sample_name));
    outcomes
}
