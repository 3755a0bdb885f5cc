//! Orchestrator configuration
//!
//! Container names, join timing, batch concurrency and the fan-out failure
//! policy.

use seqflow_core::{READ_SUFFIX, StageName};
use seqflow_runner::RetryPolicy;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Remote container holding raw reads
    pub reads_container: String,

    /// Remote container receiving results
    pub results_container: String,

    /// Container on the data volume holding sample workspaces
    pub workspace_container: String,

    /// Per-poll timeout while joining outstanding stages
    pub poll_interval: Duration,

    /// Upper bound on one join, measured from its first poll
    pub stage_timeout: Duration,

    /// Max samples running at once in a batch
    pub max_parallel_samples: usize,

    /// Fan-out stages whose failure does not fail the pipeline
    pub non_fatal_stages: BTreeSet<StageName>,

    /// Suffix identifying read files in the reads listing
    pub read_suffix: String,

    /// Recompute every stage regardless of cached outputs
    pub force_recompute: bool,

    /// Retry policy for artifact store calls
    pub store_retry: RetryPolicy,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            reads_container: "rna-seq-reads".to_string(),
            results_container: "rna-seq-pipeline-results".to_string(),
            workspace_container: "workspace".to_string(),
            poll_interval: Duration::from_secs(10),
            stage_timeout: Duration::from_secs(6 * 60 * 60),
            max_parallel_samples: 4,
            non_fatal_stages: BTreeSet::from([StageName::Strandedness]),
            read_suffix: READ_SUFFIX.to_string(),
            force_recompute: false,
            store_retry: RetryPolicy::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SEQFLOW_READS_CONTAINER (default: rna-seq-reads)
    /// - SEQFLOW_RESULTS_CONTAINER (default: rna-seq-pipeline-results)
    /// - SEQFLOW_WORKSPACE_CONTAINER (default: workspace)
    /// - SEQFLOW_POLL_INTERVAL (seconds, default: 10)
    /// - SEQFLOW_STAGE_TIMEOUT (seconds, default: 21600)
    /// - SEQFLOW_MAX_PARALLEL_SAMPLES (default: 4)
    /// - SEQFLOW_NON_FATAL_STAGES (comma-separated stage names, default: strandedness)
    /// - SEQFLOW_READ_SUFFIX (default: .fastq.gz)
    /// - SEQFLOW_STORE_RETRIES (attempts, default: 3)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    ///
    /// Fails only on an unknown stage name in the non-fatal list; other
    /// unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::new();

        let non_fatal_stages = match lookup("SEQFLOW_NON_FATAL_STAGES") {
            Some(list) => parse_stage_list(&list)?,
            None => defaults.non_fatal_stages,
        };

        let seconds = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Ok(Self {
            reads_container: lookup("SEQFLOW_READS_CONTAINER").unwrap_or(defaults.reads_container),
            results_container: lookup("SEQFLOW_RESULTS_CONTAINER")
                .unwrap_or(defaults.results_container),
            workspace_container: lookup("SEQFLOW_WORKSPACE_CONTAINER")
                .unwrap_or(defaults.workspace_container),
            poll_interval: seconds("SEQFLOW_POLL_INTERVAL", defaults.poll_interval),
            stage_timeout: seconds("SEQFLOW_STAGE_TIMEOUT", defaults.stage_timeout),
            max_parallel_samples: parse_or(
                &lookup,
                "SEQFLOW_MAX_PARALLEL_SAMPLES",
                defaults.max_parallel_samples,
            ),
            non_fatal_stages,
            read_suffix: lookup("SEQFLOW_READ_SUFFIX").unwrap_or(defaults.read_suffix),
            force_recompute: false,
            store_retry: RetryPolicy {
                max_attempts: parse_or(
                    &lookup,
                    "SEQFLOW_STORE_RETRIES",
                    defaults.store_retry.max_attempts,
                ),
                ..defaults.store_retry
            },
        })
    }

    pub fn with_force_recompute(mut self, force: bool) -> Self {
        self.force_recompute = force;
        self
    }

    /// Whether a failure of `stage` fails the whole pipeline
    pub fn is_fatal(&self, stage: StageName) -> bool {
        !self.non_fatal_stages.contains(&stage)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("reads_container", &self.reads_container),
            ("results_container", &self.results_container),
            ("workspace_container", &self.workspace_container),
        ] {
            if value.is_empty() || value.contains('/') {
                anyhow::bail!("{} must be a single path segment, got '{}'", name, value);
            }
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.stage_timeout < self.poll_interval {
            anyhow::bail!("stage_timeout must be at least poll_interval");
        }

        if self.max_parallel_samples == 0 {
            anyhow::bail!("max_parallel_samples must be greater than 0");
        }

        if let Some(stage) = self
            .non_fatal_stages
            .iter()
            .find(|stage| !StageName::FAN_OUT.contains(*stage))
        {
            anyhow::bail!("only fan-out stages can be non-fatal, got '{}'", stage);
        }

        if self.read_suffix.is_empty() {
            anyhow::bail!("read_suffix cannot be empty");
        }

        if self.store_retry.max_attempts == 0 {
            anyhow::bail!("store retries must allow at least one attempt");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_stage_list(list: &str) -> anyhow::Result<BTreeSet<StageName>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            StageName::from_str(name)
                .map_err(|e| anyhow::anyhow!("SEQFLOW_NON_FATAL_STAGES: {}", e))
        })
        .collect()
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
