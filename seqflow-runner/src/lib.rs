//! Seqflow Runner
//!
//! Executes pipeline stages on behalf of the orchestrator.
//!
//! Architecture:
//! - `TaskRunner`: submit / poll-with-timeout / cancel contract over handles
//! - `LocalTaskRunner`: in-process worker pool implementing that contract
//! - `StageExecutor`: runs one `StageTask`; `ToolExecutor` shells out to the
//!   bioinformatics tools on the shared data volume
//! - `RetryPolicy`: exponential backoff for transient failures
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use seqflow_core::SampleSpec;
//! use seqflow_runner::{Config, LocalTaskRunner, StageTask, TaskRunner, ToolExecutor};
//! use seqflow_store::FsArtifactStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env();
//! let workspace = Arc::new(FsArtifactStore::new(&config.data_dir));
//! let executor = Arc::new(ToolExecutor::new(workspace, config.clone()));
//! let runner = LocalTaskRunner::new(executor, &config);
//!
//! let sample = SampleSpec::new("S1", vec!["S1.fastq.gz".to_string()])?;
//! let output = runner.run_sync(StageTask::quality_check(&sample)).await?;
//! println!("{} finished in {:?}", output.stage, output.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
mod local;
pub mod retry;
mod runner;
pub mod task;
pub mod tools;

pub use config::{Config, ToolPaths};
pub use executor::{StageExecutor, ToolExecutor};
pub use local::LocalTaskRunner;
pub use retry::RetryPolicy;
pub use runner::{DEFAULT_POLL_INTERVAL, TaskRunner};
pub use task::StageTask;
