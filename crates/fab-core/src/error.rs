//! Error types for fab-core.

use std::path::PathBuf;

use venv_manager::VenvError;

/// Errors that end a run. Tool findings and tool spawn failures are not
/// errors; they are recorded in the run result.
#[derive(Debug, thiserror::Error)]
pub enum FabError {
    #[error(transparent)]
    Venv(#[from] VenvError),

    #[error("run interrupted")]
    Interrupted,

    #[error("run timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("failed to write report to {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("teardown failed: {0}")]
    Teardown(String),
}

/// Result type for fab-core operations.
pub type FabResult<T> = std::result::Result<T, FabError>;
