//! Error types for venv-manager

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while provisioning or tearing down an environment
#[derive(Error, Debug)]
pub enum VenvError {
    /// Project root does not exist (or is not a directory)
    #[error("Project path does not exist: {0}")]
    ProjectNotFound(PathBuf),

    /// Environment name is not a single directory name inside the project
    #[error("Invalid environment name {0:?}: must be a single directory name inside the project")]
    InvalidEnvironmentName(String),

    /// Environment is missing and the caller declined to create one
    #[error("No virtual environment at {0} and creation was declined")]
    CreationDeclined(PathBuf),

    /// `python -m venv` failed or left no directory behind
    #[error("Failed to create virtual environment at {path}: {reason}")]
    EnvironmentCreation { path: PathBuf, reason: String },

    /// A required tool could not be installed into the environment
    #[error("Failed to install {tool}: {reason}")]
    Install { tool: String, reason: String },

    /// A child process could not be started
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// Reading or writing the ignore file failed
    #[error("Ignore file update failed for {path}: {source}")]
    Hygiene {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
