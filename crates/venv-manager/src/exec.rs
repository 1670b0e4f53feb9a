//! Child process execution.
//!
//! Everything that touches a Python interpreter or a tool binary goes through
//! [`CommandExecutor`], so provisioning, installation and the toolchain run can
//! be driven by [`crate::fakes::FakeExecutor`] in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::VenvError;
use crate::Result;

/// A single command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable path or name.
    pub program: PathBuf,

    /// Arguments, one argv token each.
    pub args: Vec<String>,

    /// Working directory of the child.
    pub cwd: PathBuf,

    /// Extra environment variables layered over the parent's.
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs.extend(envs);
        self
    }

    /// Program and arguments joined by spaces, for logs and fake matching.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the child exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands to completion and captures their streams.
///
/// A non-zero exit is reported through [`CommandOutput::exit_code`], not as an
/// error. Only failing to start the child is an `Err`.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Production executor backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let start = Instant::now();
        debug!(command = %command.command_line(), cwd = ?command.cwd, "Spawning");

        // kill_on_drop: a run timeout or Ctrl-C drops this future, and the
        // child must not outlive the environment it runs from.
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VenvError::Spawn {
                program: command.program.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        let spec = CommandSpec::new("isort", Path::new("/tmp"))
            .arg(".")
            .args(["--skip", "venv"]);
        assert_eq!(spec.command_line(), "isort . --skip venv");
    }

    #[test]
    fn test_output_success() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        };
        assert!(output.success());
        assert!(!CommandOutput {
            exit_code: 2,
            ..output
        }
        .success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("echo", dir.path()).arg("hello");

        let output = ProcessExecutor.execute(&spec).await.expect("execute failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_failing_command_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("false", dir.path());

        let output = ProcessExecutor.execute(&spec).await.expect("execute failed");
        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_execute_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("definitely-not-a-real-binary-fab", dir.path());

        let err = ProcessExecutor.execute(&spec).await.unwrap_err();
        assert!(matches!(err, VenvError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_passes_env() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh", dir.path())
            .args(["-c", "echo $FAB_TEST_VALUE"])
            .envs(vec![("FAB_TEST_VALUE".to_string(), "marker".to_string())]);

        let output = ProcessExecutor.execute(&spec).await.unwrap();
        assert_eq!(output.stdout.trim(), "marker");
    }
}
