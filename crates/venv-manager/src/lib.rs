//! Venv-Manager: disposable Python virtual environments for FAB
//!
//! This crate owns everything that touches the project's filesystem or a
//! Python interpreter before and after the toolchain runs:
//!
//! - [`exec`]: the [`CommandExecutor`] seam and its `tokio::process` backend
//! - [`environment`]: project resolution, venv creation and deletion
//! - [`installer`]: probe-then-install of required tools
//! - [`hygiene`]: the temporary `.gitignore` entry for the venv directory
//! - [`fakes`]: a recording executor for tests

pub mod environment;
pub mod error;
pub mod exec;
pub mod fakes;
pub mod hygiene;
pub mod installer;

pub use environment::{
    destroy_environment, ensure_environment, validate_env_name, EnvironmentSpec, ProjectHandle,
    DEFAULT_VENV_NAME,
};
pub use error::VenvError;
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ProcessExecutor};
pub use hygiene::{begin_hygiene, end_hygiene, IgnoreEntry, IGNORE_FILE};
pub use installer::{ensure_tools_installed, InstalledTool, ToolRequirement};

/// Result type for venv-manager operations
pub type Result<T> = std::result::Result<T, VenvError>;
