//! Builders for executing external tool commands with timeout support.
//!
//! [`ToolCommand`] runs a single process and captures its output without
//! interpreting the exit code; callers that only care about success use
//! [`ToolCommand::execute`]. [`PipeCommand`] runs two processes joined by an
//! OS pipe and reports both sides' exit codes and stderr so the caller can
//! classify which side of the pipeline failed.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use dovarr_core::{Error, Result};

/// Default command timeout. Probes override this down to a minute;
/// conversion steps override it up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Timeout for container/media probes and per-sample RPU work.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for each step of the safe conversion path, muxing, and
/// authoritative frame counting.
pub const CONVERT_STEP_TIMEOUT: Duration = Duration::from_secs(3600);

/// Timeout for the piped turbo conversion.
pub const TURBO_TIMEOUT: Duration = Duration::from_secs(7200);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn arg_path(mut self, path: impl AsRef<std::path::Path>) -> Self {
        self.args.push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run the command, capturing output. The exit code is reported as-is;
    /// non-zero exits are NOT errors at this layer.
    ///
    /// # Errors
    ///
    /// Fails on spawn errors and on timeout ([`Error::Timeout`]).
    pub async fn run(&self) -> Result<ToolOutput> {
        let name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(&name)
            } else {
                Error::tool(&name, format!("failed to spawn: {e}"))
            }
        })?;

        let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        match waited {
            Ok(Ok(output)) => Ok(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(Error::tool(
                &name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(Error::Timeout {
                tool: name,
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Run the command and require a successful exit.
    ///
    /// # Errors
    ///
    /// Everything [`ToolCommand::run`] fails on, plus [`Error::Tool`] on a
    /// non-zero exit status (message includes trimmed stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        let output = self.run().await?;
        if !output.status.success() {
            return Err(Error::tool(
                self.program_name(),
                format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            ));
        }
        Ok(output)
    }
}

/// Output of a two-process pipeline.
#[derive(Debug, Clone)]
pub struct PipeOutput {
    pub first_status: ExitStatus,
    pub first_stderr: String,
    pub second_status: ExitStatus,
    pub second_stderr: String,
}

impl PipeOutput {
    /// Whether both sides of the pipeline exited successfully.
    pub fn success(&self) -> bool {
        self.first_status.success() && self.second_status.success()
    }

    /// Both stderr streams concatenated, for error classification.
    pub fn combined_stderr(&self) -> String {
        format!("{}\n{}", self.first_stderr, self.second_stderr)
    }
}

/// Two processes joined by an OS pipe: the first's stdout feeds the second's
/// stdin. Used by the turbo conversion path so the intermediate HEVC stream
/// never touches disk.
#[derive(Debug, Clone)]
pub struct PipeCommand {
    first: ToolCommand,
    second: ToolCommand,
    timeout: Duration,
}

impl PipeCommand {
    /// Build a pipeline from two prepared commands. Per-command timeouts are
    /// ignored; the pipeline enforces a single overall deadline.
    pub fn new(first: ToolCommand, second: ToolCommand) -> Self {
        Self {
            first,
            second,
            timeout: TURBO_TIMEOUT,
        }
    }

    /// Set the overall pipeline deadline.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    /// Execute the pipeline and wait for both processes.
    ///
    /// Exit codes are reported raw; classifying a non-zero status is the
    /// caller's job. Stderr of both sides is captured in full.
    pub async fn execute(&self) -> Result<PipeOutput> {
        let first_name = self.first.program_name();
        let second_name = self.second.program_name();

        let mut first = Command::new(&self.first.program);
        first
            .args(&self.first.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut first_child = first.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(&first_name)
            } else {
                Error::tool(&first_name, format!("failed to spawn: {e}"))
            }
        })?;

        let first_stdout = first_child.stdout.take().ok_or_else(|| {
            Error::tool(&first_name, "stdout handle unavailable for piping")
        })?;
        let pipe: Stdio = first_stdout.try_into().map_err(|e: std::io::Error| {
            Error::tool(&first_name, format!("failed to convert stdout to pipe: {e}"))
        })?;

        let mut second = Command::new(&self.second.program);
        second
            .args(&self.second.args)
            .stdin(pipe)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let second_child = second.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(&second_name)
            } else {
                Error::tool(&second_name, format!("failed to spawn: {e}"))
            }
        })?;

        let joined = async {
            tokio::join!(
                first_child.wait_with_output(),
                second_child.wait_with_output()
            )
        };

        match tokio::time::timeout(self.timeout, joined).await {
            Ok((Ok(first_out), Ok(second_out))) => Ok(PipeOutput {
                first_status: first_out.status,
                first_stderr: String::from_utf8_lossy(&first_out.stderr).to_string(),
                second_status: second_out.status,
                second_stderr: String::from_utf8_lossy(&second_out.stderr).to_string(),
            }),
            Ok((Err(e), _)) => Err(Error::tool(
                &first_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Ok((_, Err(e))) => Err(Error::tool(
                &second_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(Error::Timeout {
                tool: format!("{first_name} | {second_name}"),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_reports_nonzero_exit_without_error() {
        let output = ToolCommand::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .run()
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert!(output.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn execute_errors_on_nonzero_exit() {
        let result = ToolCommand::new("sh").args(["-c", "exit 1"]).execute().await;
        assert!(matches!(result, Err(Error::Tool { .. })));
    }

    #[tokio::test]
    async fn missing_tool_is_tool_not_found() {
        let result = ToolCommand::new("dovarr_no_such_tool_xyz").run().await;
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new("sleep")
            .arg("10")
            .timeout(Duration::from_millis(100))
            .run()
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn pipe_feeds_second_process() {
        let first = ToolCommand::new("sh").args(["-c", "printf 'one\\ntwo\\nthree\\n'"]);
        let second = ToolCommand::new("sh").args(["-c", "wc -l >/dev/null"]);
        let output = PipeCommand::new(first, second).execute().await.unwrap();
        assert!(output.success());
    }

    #[tokio::test]
    async fn pipe_reports_both_exit_codes() {
        let first = ToolCommand::new("sh").args(["-c", "echo demux-broke >&2; exit 2"]);
        let second = ToolCommand::new("cat");
        let output = PipeCommand::new(first, second).execute().await.unwrap();
        assert!(!output.success());
        assert_eq!(output.first_status.code(), Some(2));
        assert!(output.second_status.success());
        assert!(output.combined_stderr().contains("demux-broke"));
    }
}
