//! FAB - format and lint Python projects in a throwaway virtual environment
//!
//! `fab <PROJECT_PATH>...` creates `<project>/format_venv`, installs isort,
//! black, flake8, mypy and pylint into it, runs them in that order, and
//! deletes the environment again. Output goes to the console, or with
//! `--report` / `--output-file` to an append-only text file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fab_core::{FabConfig, FabPipeline, OutputSink, PipelineResult};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use venv_manager::{validate_env_name, CommandExecutor, ProcessExecutor, ProjectHandle};

#[derive(Parser, Debug)]
#[command(name = "fab")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Run isort, black, flake8, mypy and pylint in a disposable venv",
    long_about = None
)]
struct Cli {
    /// Python project directories to check, processed one after another
    #[arg(required = true)]
    projects: Vec<PathBuf>,

    /// Name of the environment directory created inside each project
    #[arg(long, env = "FAB_VENV_NAME", value_parser = parse_venv_name)]
    venv_name: Option<String>,

    /// Interpreter used to create the environment
    #[arg(long, env = "FAB_PYTHON")]
    python: Option<String>,

    /// Append output to <project>/<project>_formatting_results.txt
    #[arg(long, conflicts_with = "output_file")]
    report: bool,

    /// Append output to this file instead of the console
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Fail instead of creating a missing environment
    #[arg(long)]
    no_create: bool,

    /// Abort a project run (and tear down) after this many seconds
    #[arg(long, env = "FAB_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Skip upgrading pip, setuptools and wheel before installing tools
    #[arg(long)]
    no_pip_upgrade: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines and a JSON summary per project
    #[arg(long)]
    json: bool,
}

fn parse_venv_name(name: &str) -> std::result::Result<String, String> {
    validate_env_name(name)
        .map(|()| name.to_string())
        .map_err(|e| e.to_string())
}

impl Cli {
    /// Apply command-line overrides on top of `base`.
    fn config(&self, base: FabConfig) -> FabConfig {
        let mut config = base.with_allow_create(!self.no_create);
        if let Some(name) = &self.venv_name {
            config = config.with_venv_name(name.clone());
        }
        if let Some(python) = &self.python {
            config = config.with_python(python.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config.run_timeout_secs = (secs > 0).then_some(secs);
        }
        if self.no_pip_upgrade {
            config = config.with_upgrade_pip(false);
        }
        config
    }

    fn sink_for(&self, project: &Path) -> OutputSink {
        if let Some(path) = &self.output_file {
            return OutputSink::File(path.clone());
        }
        if self.report {
            // An unresolvable project fails inside the pipeline before
            // anything is written, so the console fallback is never used.
            if let Ok(handle) = ProjectHandle::resolve(project) {
                return OutputSink::default_file(&handle);
            }
        }
        OutputSink::Console
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fab_core::init_tracing(cli.json, level);

    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor);
    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    tokio::spawn(listen_for_ctrl_c(interrupt_tx));
    run_projects(&cli, executor, FabConfig::from_env(), interrupt_rx).await
}

/// Set the shared interrupt flag on the first Ctrl-C.
///
/// Never returns, so the sender outlives every receiver. If the handler
/// cannot be installed the flag simply never flips.
async fn listen_for_ctrl_c(interrupt: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            interrupt.send_replace(true);
        }
        Err(e) => error!(error = %e, "Could not listen for Ctrl-C"),
    }
    std::future::pending::<()>().await;
}

/// Resolves once the interrupt flag is set.
async fn interrupted(mut interrupt: watch::Receiver<bool>) {
    if interrupt.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run every project in turn. Fails if any run failed, after all were tried.
/// An interruption, during a run or between two runs, stops the remaining
/// projects.
async fn run_projects(
    cli: &Cli,
    executor: Arc<dyn CommandExecutor>,
    base: FabConfig,
    interrupt: watch::Receiver<bool>,
) -> Result<()> {
    let mut pipeline = FabPipeline::new(executor, cli.config(base));
    let mut failed = Vec::new();

    for project in &cli.projects {
        if *interrupt.borrow() {
            warn!(project = %project.display(), "Interrupted, skipping remaining projects");
            eprintln!("fab: interrupted before {}", project.display());
            failed.push(project.display().to_string());
            break;
        }

        let sink = cli.sink_for(project);
        match pipeline
            .run(project, &sink, interrupted(interrupt.clone()))
            .await
        {
            Ok(result) => print_summary(cli, &result)?,
            Err(e) => {
                error!(project = %project.display(), error = %e, "Run failed");
                eprintln!("fab: {}: {e}", project.display());
                failed.push(project.display().to_string());
                if matches!(e, fab_core::FabError::Interrupted) {
                    break;
                }
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} project run(s) failed: {}",
            failed.len(),
            cli.projects.len(),
            failed.join(", ")
        )
    }
}

fn print_summary(cli: &Cli, result: &PipelineResult) -> Result<()> {
    if cli.json {
        let json = result
            .to_json()
            .context("Failed to serialise run summary")?;
        println!("{json}");
        return Ok(());
    }

    if let Some(path) = &result.report_path {
        println!("Results written to {}", path.display());
    }
    for tool in &result.result.tools {
        let status = if tool.clean() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, tool.tool, tool.duration_ms, tool.exit_code
        );
    }
    println!("All checks have finished running for {}!", result.project.display());
    info!(run_id = %result.run_id, "Project done");
    Ok(())
}
