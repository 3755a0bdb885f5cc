//! External tool invocation
//!
//! Runs bioinformatics tools as child processes and captures their output.
//! Children are killed when the owning task is dropped, so aborting a stage
//! also stops the tool it was running.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Lines of tool output kept in stage diagnostics
const DIAGNOSTIC_LINES: usize = 20;

/// Captured result of a finished tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Tail of stderr, falling back to stdout when stderr is empty
    pub fn diagnostics(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };

        let lines: Vec<&str> = source.trim_end().lines().collect();
        let start = lines.len().saturating_sub(DIAGNOSTIC_LINES);
        lines[start..].join("\n")
    }
}

/// A tool command line
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line rendered for logs
    pub fn describe(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }

    /// Runs the tool to completion
    ///
    /// Fails only when the process cannot be started or waited on; a non-zero
    /// exit is reported through `ToolOutput::exit_code`.
    pub async fn run(&self) -> std::io::Result<ToolOutput> {
        debug!("Running {}", self.describe());

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .await?;

        let result = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        log_result(self, &result);
        Ok(result)
    }

    /// Runs this tool with its stdout streamed into `consumer`'s stdin
    ///
    /// The pipeline succeeds only if both processes exit with 0. Output is
    /// the consumer's, with the producer's stderr appended.
    pub async fn pipe_into(&self, consumer: &ToolCommand) -> std::io::Result<ToolOutput> {
        debug!("Running {} | {}", self.describe(), consumer.describe());

        let mut producer = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stream: Stdio = producer
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("producer stdout was not captured"))?
            .try_into()?;

        let mut sink = consumer.command();
        sink.stdin(stream);

        let (consumer_output, producer_output) =
            tokio::join!(sink.output(), producer.wait_with_output());
        let consumer_output = consumer_output?;
        let producer_output = producer_output?;

        let mut stderr = String::from_utf8_lossy(&consumer_output.stderr).to_string();
        let producer_stderr = String::from_utf8_lossy(&producer_output.stderr);
        if !producer_stderr.trim().is_empty() {
            stderr.push_str(&producer_stderr);
        }

        let consumer_code = consumer_output.status.code().unwrap_or(-1);
        let producer_code = producer_output.status.code().unwrap_or(-1);

        let result = ToolOutput {
            stdout: String::from_utf8_lossy(&consumer_output.stdout).to_string(),
            stderr,
            exit_code: if producer_code != 0 {
                producer_code
            } else {
                consumer_code
            },
        };

        log_result(consumer, &result);
        Ok(result)
    }
}

fn log_result(command: &ToolCommand, result: &ToolOutput) {
    if result.success() {
        debug!(
            "{} completed: stdout_len={}, stderr_len={}",
            command.program.display(),
            result.stdout.len(),
            result.stderr.len()
        );
    } else {
        debug!(
            "{} failed: exit_code={} stderr='{}'",
            command.program.display(),
            result.exit_code,
            result.stderr.trim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let output = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3")
            .run()
            .await
            .unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(output.diagnostics(), "err");
    }

    #[tokio::test]
    async fn test_pipe_into_streams_stdout() {
        let producer = ToolCommand::new("sh").args(["-c", "printf 'a\\nb\\nc\\n'"]);
        let consumer = ToolCommand::new("wc").arg("-l");

        let output = producer.pipe_into(&consumer).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "3");
    }

    #[tokio::test]
    async fn test_pipe_reports_producer_failure() {
        let producer = ToolCommand::new("sh").args(["-c", "echo broken >&2; exit 2"]);
        let consumer = ToolCommand::new("cat");

        let output = producer.pipe_into(&consumer).await.unwrap();
        assert_eq!(output.exit_code, 2);
        assert!(output.stderr.contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let err = ToolCommand::new("/nonexistent/seqflow-tool")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_describe_and_diagnostics_tail() {
        let command = ToolCommand::new("fastqc").args(["stdin", "--outdir", "/data/x"]);
        assert_eq!(command.describe(), "fastqc stdin --outdir /data/x");

        let long = ToolOutput {
            stdout: (0..30).map(|i| format!("line {}\n", i)).collect(),
            stderr: String::new(),
            exit_code: 0,
        };
        let tail = long.diagnostics();
        assert_eq!(tail.lines().count(), DIAGNOSTIC_LINES);
        assert!(tail.ends_with("line 29"));
    }
}
