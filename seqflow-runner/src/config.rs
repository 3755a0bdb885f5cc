//! Runner configuration
//!
//! Defines the worker pool size, task limits, tool locations and the
//! reference data every stage reads from the workspace.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Paths (or bare names resolved through `PATH`) of the external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub zcat: PathBuf,
    pub fastqc: PathBuf,
    pub fq: PathBuf,
    pub salmon: PathBuf,
    pub trim_galore: PathBuf,
    pub star: PathBuf,
    pub wig_to_bigwig: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            zcat: "zcat".into(),
            fastqc: "fastqc".into(),
            fq: "fq".into(),
            salmon: "salmon".into(),
            trim_galore: "trim_galore".into(),
            star: "STAR".into(),
            wig_to_bigwig: "wigToBigWig".into(),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the shared data volume
    pub data_dir: PathBuf,

    /// Container inside the data volume holding sample workspaces
    pub workspace_container: String,

    /// Max stage tasks executing at once
    pub max_parallel_tasks: usize,

    /// Hard limit on a single task, retries included
    pub task_timeout: Duration,

    /// Threads handed to multi-threaded tools
    pub threads: usize,

    /// Reads kept when subsampling for strandedness inference
    pub subsample_records: u64,

    /// Reference assembly name used in index keys
    pub assembly: String,

    /// Retry policy for transient task errors
    pub retry: RetryPolicy,

    pub tools: ToolPaths,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            workspace_container: "workspace".to_string(),
            max_parallel_tasks: 8,
            task_timeout: Duration::from_secs(4 * 60 * 60),
            threads: 8,
            subsample_records: 60_000,
            assembly: "R64-1-1".to_string(),
            retry: RetryPolicy::default(),
            tools: ToolPaths::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SEQFLOW_DATA_DIR (default: /data)
    /// - SEQFLOW_WORKSPACE_CONTAINER (default: workspace)
    /// - SEQFLOW_MAX_PARALLEL_TASKS (default: 8)
    /// - SEQFLOW_TASK_TIMEOUT (seconds, default: 14400)
    /// - SEQFLOW_THREADS (default: 8)
    /// - SEQFLOW_SUBSAMPLE_RECORDS (default: 60000)
    /// - SEQFLOW_ASSEMBLY (default: R64-1-1)
    /// - SEQFLOW_TRANSIENT_RETRIES (attempts, default: 3)
    /// - SEQFLOW_TOOL_ZCAT, SEQFLOW_TOOL_FASTQC, SEQFLOW_TOOL_FQ,
    ///   SEQFLOW_TOOL_SALMON, SEQFLOW_TOOL_TRIM_GALORE, SEQFLOW_TOOL_STAR,
    ///   SEQFLOW_TOOL_WIG_TO_BIGWIG
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new(lookup("SEQFLOW_DATA_DIR").unwrap_or_else(|| "/data".into()));
        let tools = ToolPaths::default();

        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        Self {
            workspace_container: lookup("SEQFLOW_WORKSPACE_CONTAINER")
                .unwrap_or(defaults.workspace_container),
            max_parallel_tasks: parse_or(
                &lookup,
                "SEQFLOW_MAX_PARALLEL_TASKS",
                defaults.max_parallel_tasks,
            ),
            task_timeout: lookup("SEQFLOW_TASK_TIMEOUT")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_timeout),
            threads: parse_or(&lookup, "SEQFLOW_THREADS", defaults.threads),
            subsample_records: parse_or(
                &lookup,
                "SEQFLOW_SUBSAMPLE_RECORDS",
                defaults.subsample_records,
            ),
            assembly: lookup("SEQFLOW_ASSEMBLY").unwrap_or(defaults.assembly),
            retry: RetryPolicy {
                max_attempts: parse_or(
                    &lookup,
                    "SEQFLOW_TRANSIENT_RETRIES",
                    defaults.retry.max_attempts,
                ),
                ..defaults.retry
            },
            tools: ToolPaths {
                zcat: path("SEQFLOW_TOOL_ZCAT", tools.zcat),
                fastqc: path("SEQFLOW_TOOL_FASTQC", tools.fastqc),
                fq: path("SEQFLOW_TOOL_FQ", tools.fq),
                salmon: path("SEQFLOW_TOOL_SALMON", tools.salmon),
                trim_galore: path("SEQFLOW_TOOL_TRIM_GALORE", tools.trim_galore),
                star: path("SEQFLOW_TOOL_STAR", tools.star),
                wig_to_bigwig: path("SEQFLOW_TOOL_WIG_TO_BIGWIG", tools.wig_to_bigwig),
            },
            data_dir: defaults.data_dir,
        }
    }

    /// Workspace key of the aligner genome index directory
    pub fn genome_index_key(&self) -> String {
        "references/genome-index".to_string()
    }

    /// Workspace key of the quantification transcript index directory
    pub fn salmon_index_key(&self) -> String {
        format!("references/salmon_index/{}/transcripts_index", self.assembly)
    }

    /// Workspace key of the chromosome sizes table
    pub fn chrom_sizes_key(&self) -> String {
        "references/chrom.sizes".to_string()
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir cannot be empty");
        }

        if self.workspace_container.is_empty() || self.workspace_container.contains('/') {
            anyhow::bail!(
                "workspace_container must be a single path segment, got '{}'",
                self.workspace_container
            );
        }

        if self.max_parallel_tasks == 0 {
            anyhow::bail!("max_parallel_tasks must be greater than 0");
        }

        if self.task_timeout.is_zero() {
            anyhow::bail!("task_timeout must be greater than 0");
        }

        if self.threads == 0 {
            anyhow::bail!("threads must be greater than 0");
        }

        if self.subsample_records == 0 {
            anyhow::bail!("subsample_records must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("transient retries must allow at least one attempt");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("/data")
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.workspace_container, "workspace");
        assert_eq!(config.threads, 8);
        assert_eq!(config.subsample_records, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SEQFLOW_DATA_DIR", "/mnt/vol"),
            ("SEQFLOW_MAX_PARALLEL_TASKS", "2"),
            ("SEQFLOW_TASK_TIMEOUT", "60"),
            ("SEQFLOW_TRANSIENT_RETRIES", "5"),
            ("SEQFLOW_TOOL_STAR", "/opt/star/bin/STAR"),
        ]));

        assert_eq!(config.data_dir, PathBuf::from("/mnt/vol"));
        assert_eq!(config.max_parallel_tasks, 2);
        assert_eq!(config.task_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.tools.star, PathBuf::from("/opt/star/bin/STAR"));
        assert_eq!(config.tools.fastqc, PathBuf::from("fastqc"));
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("SEQFLOW_THREADS", "lots")]));
        assert_eq!(config.threads, 8);
    }

    #[test]
    fn test_reference_keys() {
        let config = Config::default();
        assert_eq!(
            config.salmon_index_key(),
            "references/salmon_index/R64-1-1/transcripts_index"
        );
        assert_eq!(config.chrom_sizes_key(), "references/chrom.sizes");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.max_parallel_tasks = 0;
        assert!(config.validate().is_err());
        config.max_parallel_tasks = 1;

        config.workspace_container = "a/b".to_string();
        assert!(config.validate().is_err());
        config.workspace_container = "workspace".to_string();

        config.task_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
