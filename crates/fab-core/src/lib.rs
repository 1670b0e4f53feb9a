//! FAB Core - Python quality toolchain in a throwaway virtual environment
//!
//! Provides a pipeline that:
//! - Creates a venv inside the project and installs missing tools into it
//! - Runs isort, black, flake8, mypy and pylint in that order, each told to
//!   skip the venv itself
//! - Prints the captured output or appends it to a report file
//! - Removes the venv and its `.gitignore` entry however the run ends

pub mod config;
pub mod error;
pub mod exclusion;
pub mod obs;
pub mod pipeline;
pub mod runner;
pub mod sink;
pub mod telemetry;
pub mod tool;

// Re-export key types
pub use config::FabConfig;
pub use error::{FabError, FabResult};
pub use exclusion::{compile_all, compile_exclusions, ExclusionArgs, ExclusionSet, ExclusionSyntax};
pub use pipeline::{FabPipeline, PipelineResult, RunPhase};
pub use runner::{RunResult, ToolOutcome, ToolRun, ToolchainRunner};
pub use sink::{OutputSink, ReportHeader};
pub use telemetry::init_tracing;
pub use tool::{ToolManifest, ToolRole, ToolSpec, TOOLCHAIN};
