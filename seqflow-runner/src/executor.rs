//! Stage execution
//!
//! A `StageExecutor` turns one `StageTask` into work. The `ToolExecutor`
//! resolves the task's workspace keys to paths on the data volume and shells
//! out to the matching tool.

use async_trait::async_trait;
use seqflow_core::{FailureKind, StageFailure, StageName, StageOutput};
use seqflow_store::ArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::task::StageTask;
use crate::tools::{ToolCommand, ToolOutput};

/// Sorting memory handed to the aligner, in bytes
pub const ALIGNER_SORT_RAM: u64 = 1_174_874_044;

/// Chromosome sizes of the R64-1-1 yeast assembly
pub const DEFAULT_CHROM_SIZES: &[(&str, u64)] = &[
    ("I", 230_218),
    ("II", 813_184),
    ("III", 316_620),
    ("IV", 1_531_933),
    ("IX", 439_888),
    ("V", 576_874),
    ("VI", 270_161),
    ("VII", 1_090_940),
    ("VIII", 562_643),
    ("X", 745_751),
    ("XI", 666_816),
    ("XII", 1_078_177),
    ("XIII", 924_431),
    ("XIV", 784_333),
    ("XV", 1_091_291),
    ("XVI", 948_066),
];

/// Renders a chromosome sizes table in the tab-separated format the
/// conversion tool reads
pub fn chrom_sizes_table(sizes: &[(&str, u64)]) -> String {
    sizes
        .iter()
        .map(|(name, size)| format!("{}\t{}\n", name, size))
        .collect()
}

/// Executes stage tasks
///
/// Errors with `FailureKind::Transient` may be retried by the runner; every
/// other kind is final.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, task: &StageTask) -> Result<StageOutput, StageFailure>;
}

/// Executor running the bioinformatics tools on the shared data volume
pub struct ToolExecutor {
    workspace: Arc<dyn ArtifactStore>,
    config: Config,
}

impl ToolExecutor {
    /// Creates a new tool executor
    ///
    /// # Arguments
    /// * `workspace` - Store for the workspace container; must expose local paths
    /// * `config` - Runner configuration
    pub fn new(workspace: Arc<dyn ArtifactStore>, config: Config) -> Self {
        Self { workspace, config }
    }

    /// Reference data missing from the workspace
    ///
    /// Index directories count as present when at least one file exists
    /// under them. The chromosome sizes table is seeded separately and is
    /// never reported.
    pub async fn missing_references(&self) -> Result<Vec<String>, seqflow_store::StoreError> {
        let container = &self.config.workspace_container;
        let mut missing = Vec::new();

        for key in [self.config.genome_index_key(), self.config.salmon_index_key()] {
            let prefix = format!("{}/", key);
            if self.workspace.list(container, &prefix).await?.is_empty() {
                missing.push(key);
            }
        }

        Ok(missing)
    }

    fn path(&self, stage: StageName, key: &str) -> Result<PathBuf, StageFailure> {
        self.workspace
            .local_path(&self.config.workspace_container, key)
            .ok_or_else(|| {
                StageFailure::new(
                    stage,
                    FailureKind::Internal,
                    format!("workspace key '{}' has no local path", key),
                )
            })
    }

    fn paths(&self, stage: StageName, keys: &[String]) -> Result<Vec<PathBuf>, StageFailure> {
        keys.iter().map(|key| self.path(stage, key)).collect()
    }

    /// Resolves a directory key and makes sure the directory exists
    async fn output_dir(&self, stage: StageName, key: &str) -> Result<PathBuf, StageFailure> {
        let dir = self.path(stage, key)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_failure(stage, &format!("create {}", dir.display()), e))?;
        Ok(dir)
    }

    /// Writes the built-in chromosome sizes table unless one already exists
    ///
    /// Called once before any sample runs; conversions only read the table.
    pub async fn seed_chrom_sizes(&self) -> Result<(), seqflow_store::StoreError> {
        let container = &self.config.workspace_container;
        let key = self.config.chrom_sizes_key();

        let existing = self.workspace.stat(container, &key).await?;
        if !matches!(existing, Some(size) if size > 0) {
            info!("Writing default chromosome sizes to {}", key);
            self.workspace
                .put(
                    container,
                    &key,
                    chrom_sizes_table(DEFAULT_CHROM_SIZES).into_bytes(),
                )
                .await?;
        }
        Ok(())
    }

    async fn chrom_sizes(&self) -> Result<PathBuf, StageFailure> {
        let stage = StageName::Conversion;
        let key = self.config.chrom_sizes_key();

        let existing = self
            .workspace
            .stat(&self.config.workspace_container, &key)
            .await
            .map_err(|e| store_failure(stage, e))?;
        if existing.is_none() {
            return Err(StageFailure::new(
                stage,
                FailureKind::Internal,
                format!("chromosome sizes table '{}' is missing", key),
            ));
        }

        self.path(stage, &key)
    }

    async fn quality_check(
        &self,
        reads: &[String],
        output_dir: &str,
    ) -> Result<ToolOutput, StageFailure> {
        let stage = StageName::QualityCheck;
        let reads = self.paths(stage, reads)?;
        let out = self.output_dir(stage, output_dir).await?;

        let decompress = ToolCommand::new(&self.config.tools.zcat).args(&reads);
        let fastqc = ToolCommand::new(&self.config.tools.fastqc)
            .arg("stdin")
            .arg("--outdir")
            .arg(&out);

        decompress
            .pipe_into(&fastqc)
            .await
            .map_err(|e| spawn_failure(stage, &fastqc, e))
    }

    async fn strandedness(
        &self,
        reads: &[String],
        subsampled: &[String],
        output_dir: &str,
    ) -> Result<ToolOutput, StageFailure> {
        let stage = StageName::Strandedness;
        let reads = self.paths(stage, reads)?;
        let subsampled = self.paths(stage, subsampled)?;

        if reads.len() != subsampled.len() || reads.is_empty() || reads.len() > 2 {
            return Err(StageFailure::new(
                stage,
                FailureKind::Internal,
                format!(
                    "expected matching read and subsample lists, got {} and {}",
                    reads.len(),
                    subsampled.len()
                ),
            ));
        }

        for path in &subsampled {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_failure(stage, &format!("create {}", parent.display()), e))?;
            }
        }

        let mut subsample = ToolCommand::new(&self.config.tools.fq)
            .arg("subsample")
            .args(&reads)
            .arg("--record-count")
            .arg(self.config.subsample_records.to_string())
            .arg("--r1-dst")
            .arg(&subsampled[0]);
        if let Some(r2) = subsampled.get(1) {
            subsample = subsample.arg("--r2-dst").arg(r2);
        }
        let output = run_checked(stage, &subsample).await?;
        debug!("Subsampled reads: {}", output.diagnostics());

        let out = self.output_dir(stage, output_dir).await?;
        let index = self.path(stage, &self.config.salmon_index_key())?;

        let mut quant = ToolCommand::new(&self.config.tools.salmon)
            .arg("quant")
            .arg("-i")
            .arg(&index)
            .arg("--libType")
            .arg("A")
            .arg("--threads")
            .arg(self.config.threads.to_string());
        quant = match subsampled.as_slice() {
            [single] => quant.arg("-r").arg(single),
            [r1, r2] => quant.arg("-1").arg(r1).arg("-2").arg(r2),
            _ => quant,
        };
        let quant = quant.arg("--validateMappings").arg("-o").arg(&out);

        quant.run().await.map_err(|e| spawn_failure(stage, &quant, e))
    }

    async fn trimming(&self, reads: &[String], output_dir: &str) -> Result<ToolOutput, StageFailure> {
        let stage = StageName::Trimming;
        let reads = self.paths(stage, reads)?;
        let out = self.output_dir(stage, output_dir).await?;

        let mut trim = ToolCommand::new(&self.config.tools.trim_galore);
        if reads.len() == 2 {
            trim = trim.arg("--paired");
        }
        let trim = trim.arg("--dont_gzip").arg("-o").arg(&out).args(&reads);

        trim.run().await.map_err(|e| spawn_failure(stage, &trim, e))
    }

    async fn alignment(
        &self,
        trimmed: &[String],
        output_dir: &str,
    ) -> Result<ToolOutput, StageFailure> {
        let stage = StageName::Alignment;
        let trimmed = self.paths(stage, trimmed)?;
        let out = self.output_dir(stage, output_dir).await?;
        let index = self.path(stage, &self.config.genome_index_key())?;

        // The aligner appends file names directly to the prefix
        let mut prefix = out.into_os_string();
        prefix.push("/");

        let star = ToolCommand::new(&self.config.tools.star)
            .arg("--runThreadN")
            .arg(self.config.threads.to_string())
            .arg("--genomeDir")
            .arg(&index)
            .arg("--readFilesIn")
            .args(&trimmed)
            .args(["--outWigType", "wiggle"])
            .args(["--outSAMtype", "BAM", "SortedByCoordinate"])
            .arg("--limitBAMsortRAM")
            .arg(ALIGNER_SORT_RAM.to_string())
            .arg("--outFileNamePrefix")
            .arg(prefix);

        star.run().await.map_err(|e| spawn_failure(stage, &star, e))
    }

    async fn conversion(&self, wig: &str, bigwig: &str) -> Result<ToolOutput, StageFailure> {
        let stage = StageName::Conversion;
        let wig = self.path(stage, wig)?;
        let bigwig = self.path(stage, bigwig)?;
        let chrom_sizes = self.chrom_sizes().await?;

        let convert = ToolCommand::new(&self.config.tools.wig_to_bigwig)
            .arg(&wig)
            .arg(&chrom_sizes)
            .arg(&bigwig);

        convert
            .run()
            .await
            .map_err(|e| spawn_failure(stage, &convert, e))
    }
}

#[async_trait]
impl StageExecutor for ToolExecutor {
    async fn execute(&self, task: &StageTask) -> Result<StageOutput, StageFailure> {
        let stage = task.stage();
        let started = Instant::now();
        info!("Executing {}", task);

        let output = match task {
            StageTask::QualityCheck {
                reads, output_dir, ..
            } => self.quality_check(reads, output_dir).await?,
            StageTask::Strandedness {
                reads,
                subsampled,
                output_dir,
                ..
            } => self.strandedness(reads, subsampled, output_dir).await?,
            StageTask::Trimming {
                reads, output_dir, ..
            } => self.trimming(reads, output_dir).await?,
            StageTask::Alignment {
                trimmed,
                output_dir,
                ..
            } => self.alignment(trimmed, output_dir).await?,
            StageTask::Conversion { wig, bigwig, .. } => self.conversion(wig, bigwig).await?,
        };

        if !output.success() {
            return Err(StageFailure::new(
                stage,
                FailureKind::Tool,
                format!(
                    "exited with code {}: {}",
                    output.exit_code,
                    output.diagnostics()
                ),
            ));
        }

        Ok(StageOutput {
            stage,
            diagnostics: output.diagnostics(),
            elapsed: started.elapsed(),
        })
    }
}

/// Runs an intermediate command and fails the stage on a non-zero exit
async fn run_checked(stage: StageName, command: &ToolCommand) -> Result<ToolOutput, StageFailure> {
    let output = command
        .run()
        .await
        .map_err(|e| spawn_failure(stage, command, e))?;

    if !output.success() {
        return Err(StageFailure::new(
            stage,
            FailureKind::Tool,
            format!(
                "{} exited with code {}: {}",
                command.program().display(),
                output.exit_code,
                output.diagnostics()
            ),
        ));
    }

    Ok(output)
}

/// A tool that cannot be found will not appear on retry; anything else
/// about starting a process is treated as transient.
fn spawn_failure(stage: StageName, command: &ToolCommand, e: std::io::Error) -> StageFailure {
    let kind = if e.kind() == std::io::ErrorKind::NotFound {
        FailureKind::Tool
    } else {
        FailureKind::Transient
    };
    StageFailure::new(
        stage,
        kind,
        format!("failed to run {}: {}", command.program().display(), e),
    )
}

fn io_failure(stage: StageName, what: &str, e: std::io::Error) -> StageFailure {
    StageFailure::new(stage, FailureKind::Transient, format!("{}: {}", what, e))
}

fn store_failure(stage: StageName, e: seqflow_store::StoreError) -> StageFailure {
    let kind = if e.is_transient() {
        FailureKind::Transient
    } else {
        FailureKind::Internal
    };
    StageFailure::new(stage, kind, e.to_string())
}
