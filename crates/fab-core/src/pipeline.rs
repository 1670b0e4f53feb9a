//! Run orchestration: provision, install, exclude, run, report, tear down.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};
use uuid::Uuid;
use venv_manager::{
    begin_hygiene, destroy_environment, end_hygiene, ensure_environment, ensure_tools_installed,
    CommandExecutor, EnvironmentSpec, IgnoreEntry, InstalledTool, ProjectHandle,
};

use crate::config::FabConfig;
use crate::error::{FabError, FabResult};
use crate::exclusion::{compile_all, ExclusionArgs, ExclusionSet};
use crate::obs;
use crate::runner::{RunResult, ToolchainRunner};
use crate::sink::{OutputSink, ReportHeader};
use crate::tool::ToolManifest;

/// Where a run is in its lifecycle.
///
/// `Idle -> Provisioning -> Installing -> Excluding -> Running -> TearingDown -> Idle`.
/// A fatal error skips straight to `TearingDown`; every run ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Provisioning,
    Installing,
    Excluding,
    Running,
    TearingDown,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Provisioning => "provisioning",
            RunPhase::Installing => "installing",
            RunPhase::Excluding => "excluding",
            RunPhase::Running => "running",
            RunPhase::TearingDown => "tearing_down",
        };
        f.write_str(name)
    }
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run ID.
    pub run_id: String,

    /// Canonical project root.
    pub project: PathBuf,

    /// Whether this run created the environment (as opposed to reusing one).
    pub environment_created: bool,

    /// Tool availability as found by the installer.
    pub installed: Vec<InstalledTool>,

    /// Captured toolchain output.
    pub result: RunResult,

    /// Report file, when the sink was a file.
    pub report_path: Option<PathBuf>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Summary as a JSON document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// What the guarded region hands back on success. Tool output is collected
/// separately so that a run cut short can still report it.
struct GuardedOutput {
    environment_created: bool,
    installed: Vec<InstalledTool>,
}

/// Orchestrates one project run at a time.
///
/// Runs against the same project must not overlap: they would race on the
/// environment directory and the ignore file.
pub struct FabPipeline {
    executor: Arc<dyn CommandExecutor>,
    config: FabConfig,
    manifest: ToolManifest,
    phases: Vec<RunPhase>,
}

impl FabPipeline {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: FabConfig) -> Self {
        Self {
            executor,
            config,
            manifest: ToolManifest::standard(),
            phases: Vec::new(),
        }
    }

    /// Replace the standard five-tool manifest.
    pub fn with_manifest(mut self, manifest: ToolManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn config(&self) -> &FabConfig {
        &self.config
    }

    /// Phases visited by the most recent run, in order.
    pub fn phase_history(&self) -> &[RunPhase] {
        &self.phases
    }

    /// Run the toolchain against `project_path`, sending output to `sink`.
    ///
    /// A missing project or an unusable environment name fails before
    /// anything is written. From then on the environment directory and the
    /// ignore-file entry are removed on every path out: success, setup
    /// failure, run timeout, or `shutdown` resolving (e.g. Ctrl-C). Tools
    /// that finished before a timeout or interruption are still reported.
    pub async fn run<F>(
        &mut self,
        project_path: &Path,
        sink: &OutputSink,
        shutdown: F,
    ) -> FabResult<PipelineResult>
    where
        F: Future<Output = ()>,
    {
        self.phases.clear();
        self.phases.push(RunPhase::Idle);

        let project = ProjectHandle::resolve(project_path)?;
        let env = EnvironmentSpec::new(&project, &self.config.venv_name)?;
        let run_id = Uuid::new_v4().to_string();
        let span = obs::RunSpan::new(&run_id, project.root());

        self.run_resolved(project, env, run_id, sink, shutdown)
            .instrument(span.span())
            .await
    }

    async fn run_resolved<F>(
        &mut self,
        project: ProjectHandle,
        env: EnvironmentSpec,
        run_id: String,
        sink: &OutputSink,
        shutdown: F,
    ) -> FabResult<PipelineResult>
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        obs::emit_run_started(&run_id, project.root(), &self.config.venv_name);
        let header = ReportHeader {
            run_id: run_id.clone(),
            project: project.root().to_path_buf(),
            started_at: Utc::now(),
        };

        enter(&mut self.phases, RunPhase::Provisioning);
        let ignore_entry = match begin_hygiene(&env) {
            Ok(entry) => Some(entry),
            Err(e) => {
                obs::emit_cleanup_fault("begin_hygiene", &e);
                None
            }
        };

        let mut result = RunResult::default();
        let run_timeout = self.config.run_timeout();
        let guarded = guarded_region(
            self.executor.as_ref(),
            &self.config,
            &self.manifest,
            &project,
            &mut self.phases,
            &mut result,
        );
        let bounded = async move {
            match run_timeout {
                Some(limit) => tokio::time::timeout(limit, guarded)
                    .await
                    .unwrap_or(Err(FabError::TimedOut {
                        secs: limit.as_secs(),
                    })),
                None => guarded.await,
            }
        };
        let outcome = tokio::select! {
            outcome = bounded => outcome,
            _ = shutdown => Err(FabError::Interrupted),
        };

        let outcome = match outcome {
            Ok(output) => sink.emit(&header, &result).map(|()| {
                info!("All checks have finished running");
                output
            }),
            Err(e @ (FabError::TimedOut { .. } | FabError::Interrupted)) => {
                report_partial(sink, &header, &result);
                Err(e)
            }
            Err(e) => Err(e),
        };

        enter(&mut self.phases, RunPhase::TearingDown);
        let cleaned = teardown(&env, ignore_entry.as_ref());
        enter(&mut self.phases, RunPhase::Idle);

        let duration_ms = start.elapsed().as_millis() as u64;
        match (outcome, cleaned) {
            (Ok(output), Ok(())) => {
                obs::emit_run_finished(
                    &run_id,
                    duration_ms,
                    result.tools.len(),
                    result.fault_count(),
                );
                Ok(PipelineResult {
                    run_id,
                    project: project.root().to_path_buf(),
                    environment_created: output.environment_created,
                    installed: output.installed,
                    result,
                    report_path: sink.report_path().map(Path::to_path_buf),
                    duration_ms,
                })
            }
            (Ok(_), Err(e)) | (Err(e), _) => {
                obs::emit_run_aborted(&run_id, &e, result.tools.len());
                Err(e)
            }
        }
    }
}

/// Everything between provisioning and teardown.
async fn guarded_region(
    executor: &dyn CommandExecutor,
    config: &FabConfig,
    manifest: &ToolManifest,
    project: &ProjectHandle,
    phases: &mut Vec<RunPhase>,
    result: &mut RunResult,
) -> FabResult<GuardedOutput> {
    let env = ensure_environment(
        executor,
        project,
        &config.venv_name,
        &config.python,
        config.allow_create,
    )
    .await?;

    enter(phases, RunPhase::Installing);
    let installed =
        ensure_tools_installed(executor, &env, &manifest.requirements(), config.upgrade_pip)
            .await?;

    enter(phases, RunPhase::Excluding);
    let exclusions: BTreeMap<String, ExclusionArgs> =
        compile_all(&ExclusionSet::for_environment(&env.name), manifest);

    enter(phases, RunPhase::Running);
    ToolchainRunner::run_toolchain_into(executor, &env, manifest, &exclusions, result).await;

    Ok(GuardedOutput {
        environment_created: env.created,
        installed,
    })
}

/// Send the tools that finished before a timeout or interruption to the
/// sink. Nothing is written if the chain never started.
fn report_partial(sink: &OutputSink, header: &ReportHeader, result: &RunResult) {
    if result.completed || result.tools.is_empty() {
        return;
    }
    if let Err(e) = sink.emit(header, result) {
        obs::emit_cleanup_fault("partial_report", &e);
    }
}

/// Remove the environment, then the ignore entry. An ignore-file failure is
/// only logged; a directory that could not be removed is an error.
fn teardown(env: &EnvironmentSpec, ignore_entry: Option<&IgnoreEntry>) -> FabResult<()> {
    let destroyed = destroy_environment(env).map_err(|e| {
        obs::emit_cleanup_fault("destroy_environment", &e);
        FabError::Teardown(format!("could not remove {}: {e}", env.dir.display()))
    });

    if let Some(entry) = ignore_entry {
        if let Err(e) = end_hygiene(entry) {
            obs::emit_cleanup_fault("end_hygiene", &e);
        }
    }

    destroyed
}

fn enter(phases: &mut Vec<RunPhase>, phase: RunPhase) {
    phases.push(phase);
    obs::emit_phase(phase);
}
