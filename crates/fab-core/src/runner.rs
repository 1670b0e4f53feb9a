//! Toolchain execution inside a provisioned environment.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use venv_manager::{CommandExecutor, CommandSpec, EnvironmentSpec};

use crate::exclusion::ExclusionArgs;
use crate::tool::{ToolManifest, ToolRole, ToolSpec};

/// How a tool invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum ToolOutcome {
    /// The process ran to completion (any exit code).
    Ran,

    /// The process could not be run at all.
    Raised(String),
}

/// Captured result of one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRun {
    /// Tool name.
    pub tool: String,

    /// Report header name.
    pub display_name: String,

    pub role: ToolRole,

    /// Exit code (-1 when the tool raised).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    pub outcome: ToolOutcome,
}

impl ToolRun {
    /// Whether the tool ran and exited 0.
    pub fn clean(&self) -> bool {
        self.outcome == ToolOutcome::Ran && self.exit_code == 0
    }
}

/// Ordered results of one toolchain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// One entry per tool, in manifest order.
    pub tools: Vec<ToolRun>,

    /// Every manifest tool was attempted. False for a run cut short by a
    /// timeout or interruption.
    pub completed: bool,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunResult {
    pub fn get(&self, tool: &str) -> Option<&ToolRun> {
        self.tools.iter().find(|t| t.tool == tool)
    }

    /// Number of tools that exited non-zero or raised.
    pub fn fault_count(&self) -> usize {
        self.tools.iter().filter(|t| !t.clean()).count()
    }
}

/// Runs the toolchain one tool at a time.
pub struct ToolchainRunner;

impl ToolchainRunner {
    /// Run every tool in `manifest` order from the environment's bin
    /// directory, with the project root as working directory.
    ///
    /// A non-zero exit or a spawn failure is recorded for that tool and the
    /// next tool still runs; nothing here aborts the chain.
    pub async fn run_toolchain(
        executor: &dyn CommandExecutor,
        env: &EnvironmentSpec,
        manifest: &ToolManifest,
        exclusions: &BTreeMap<String, ExclusionArgs>,
    ) -> RunResult {
        let mut result = RunResult::default();
        Self::run_toolchain_into(executor, env, manifest, exclusions, &mut result).await;
        result
    }

    /// Like [`ToolchainRunner::run_toolchain`], but records each finished
    /// tool into `result` as it goes.
    ///
    /// If the future is dropped part-way (run timeout, interruption),
    /// `result` keeps the tools that finished and `completed` stays false.
    pub async fn run_toolchain_into(
        executor: &dyn CommandExecutor,
        env: &EnvironmentSpec,
        manifest: &ToolManifest,
        exclusions: &BTreeMap<String, ExclusionArgs>,
        result: &mut RunResult,
    ) {
        let start = Instant::now();
        result.tools.clear();
        result.completed = false;

        for tool in manifest.tools() {
            let args = exclusions.get(tool.name).cloned().unwrap_or_default();
            let run = Self::run_tool(executor, env, tool, &args).await;
            result.tools.push(run);
            result.duration_ms = start.elapsed().as_millis() as u64;
        }

        result.completed = true;
    }

    /// Run a single tool and capture its streams.
    pub async fn run_tool(
        executor: &dyn CommandExecutor,
        env: &EnvironmentSpec,
        tool: &ToolSpec,
        exclusions: &ExclusionArgs,
    ) -> ToolRun {
        let command = CommandSpec::new(env.executable(tool.name), &env.project_root)
            .args(tool.args.iter().copied())
            .args(exclusions.as_slice().iter().cloned())
            .envs(env.activation_env());

        info!(tool = tool.name, command = %command.command_line(), "Running tool");
        let start = Instant::now();

        match executor.execute(&command).await {
            Ok(output) => {
                if output.success() {
                    info!(tool = tool.name, duration_ms = output.duration_ms, "Tool finished");
                } else {
                    info!(
                        tool = tool.name,
                        exit_code = output.exit_code,
                        "Tool reported findings"
                    );
                }
                ToolRun {
                    tool: tool.name.to_string(),
                    display_name: tool.display_name.to_string(),
                    role: tool.role,
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration_ms: output.duration_ms,
                    outcome: ToolOutcome::Ran,
                }
            }
            Err(e) => {
                warn!(tool = tool.name, error = %e, "Tool failed to run");
                ToolRun {
                    tool: tool.name.to_string(),
                    display_name: tool.display_name.to_string(),
                    role: tool.role,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    outcome: ToolOutcome::Raised(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::{compile_all, ExclusionSet};
    use tempfile::tempdir;
    use venv_manager::fakes::{FakeExecutor, FakeResponse};
    use venv_manager::ProjectHandle;

    fn setup(dir: &std::path::Path) -> (EnvironmentSpec, BTreeMap<String, ExclusionArgs>) {
        let project = ProjectHandle::resolve(dir).unwrap();
        let env = EnvironmentSpec::new(&project, "format_venv").unwrap();
        let exclusions = compile_all(
            &ExclusionSet::for_environment("format_venv"),
            &ToolManifest::standard(),
        );
        (env, exclusions)
    }

    #[test]
    fn test_tool_run_clean() {
        let run = ToolRun {
            tool: "flake8".to_string(),
            display_name: "Flake8".to_string(),
            role: ToolRole::StyleLinter,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 10,
            outcome: ToolOutcome::Ran,
        };
        assert!(run.clean());
        assert!(!ToolRun {
            exit_code: 1,
            ..run.clone()
        }
        .clean());
        assert!(!ToolRun {
            outcome: ToolOutcome::Raised("gone".to_string()),
            ..run
        }
        .clean());
    }

    #[tokio::test]
    async fn test_runs_in_manifest_order_from_project_root() {
        let dir = tempdir().unwrap();
        let (env, exclusions) = setup(dir.path());
        let executor = FakeExecutor::new();

        let result = ToolchainRunner::run_toolchain(
            &executor,
            &env,
            &ToolManifest::standard(),
            &exclusions,
        )
        .await;

        assert!(result.completed);
        let names: Vec<_> = result.tools.iter().map(|t| t.tool.as_str()).collect();
        assert_eq!(names, vec!["isort", "black", "flake8", "mypy", "pylint"]);

        let calls = executor.calls();
        assert_eq!(calls.len(), 5);
        for (call, tool) in calls.iter().zip(ToolManifest::standard().tools()) {
            assert_eq!(call.program, env.executable(tool.name));
            assert_eq!(call.cwd, env.project_root);
            assert!(call.envs.iter().any(|(k, _)| k == "VIRTUAL_ENV"));
        }
        assert_eq!(
            executor.command_lines()[2],
            format!(
                "{} . --exclude .venv,venv,format_venv",
                env.executable("flake8").display()
            )
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_recorded_and_chain_continues() {
        let dir = tempdir().unwrap();
        let (env, exclusions) = setup(dir.path());
        let executor =
            FakeExecutor::new().on("flake8", FakeResponse::exit(1, "3 errors found", ""));

        let result = ToolchainRunner::run_toolchain(
            &executor,
            &env,
            &ToolManifest::standard(),
            &exclusions,
        )
        .await;

        let flake8 = result.get("flake8").unwrap();
        assert_eq!(flake8.stdout, "3 errors found");
        assert_eq!(flake8.exit_code, 1);
        assert_eq!(flake8.outcome, ToolOutcome::Ran);

        let mypy = result.get("mypy").unwrap();
        assert!(mypy.clean());
        assert_eq!(result.fault_count(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_recorded_as_raised() {
        let dir = tempdir().unwrap();
        let (env, exclusions) = setup(dir.path());
        let mypy_path = env.executable("mypy").display().to_string();
        let executor = FakeExecutor::new().on(&mypy_path, FakeResponse::spawn_error("not found"));

        let result = ToolchainRunner::run_toolchain(
            &executor,
            &env,
            &ToolManifest::standard(),
            &exclusions,
        )
        .await;

        assert!(result.completed);
        assert_eq!(result.tools.len(), 5);
        let mypy = result.get("mypy").unwrap();
        assert!(matches!(mypy.outcome, ToolOutcome::Raised(_)));
        assert!(mypy.stderr.contains("not found"));
        assert!(result.get("pylint").unwrap().clean());
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_kept_apart() {
        let dir = tempdir().unwrap();
        let (env, exclusions) = setup(dir.path());
        let executor = FakeExecutor::new().on(
            "black",
            FakeResponse::exit(0, "", "All done! 3 files left unchanged."),
        );

        let result = ToolchainRunner::run_toolchain(
            &executor,
            &env,
            &ToolManifest::standard(),
            &exclusions,
        )
        .await;

        let black = result.get("black").unwrap();
        assert!(black.stdout.is_empty());
        assert_eq!(black.stderr, "All done! 3 files left unchanged.");
        assert!(result.get("isort").unwrap().stderr.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cut_short_run_keeps_finished_tools() {
        let dir = tempdir().unwrap();
        let (env, exclusions) = setup(dir.path());
        let flake8_run = format!("{} .", env.executable("flake8").display());
        let executor = FakeExecutor::new().on(&flake8_run, FakeResponse::Hang);
        let mut partial = RunResult::default();

        let finished = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ToolchainRunner::run_toolchain_into(
                &executor,
                &env,
                &ToolManifest::standard(),
                &exclusions,
                &mut partial,
            ),
        )
        .await;

        assert!(finished.is_err());
        assert!(!partial.completed);
        let names: Vec<_> = partial.tools.iter().map(|t| t.tool.as_str()).collect();
        assert_eq!(names, vec!["isort", "black"]);
    }
}
