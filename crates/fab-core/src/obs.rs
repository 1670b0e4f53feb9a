//! Structured lifecycle events for a run.
//!
//! - [`RunSpan`] tags everything logged during a run with its id and project
//! - `emit_*` functions log the key transitions at `info!`/`warn!` level

use std::path::Path;

use tracing::{info, warn};

use crate::pipeline::RunPhase;

/// Run-scoped span carrying `run_id` and `project`.
///
/// Not entered on creation: the pipeline awaits inside it, so it is attached
/// with `tracing::Instrument` via [`RunSpan::span`].
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str, project: &Path) -> Self {
        Self {
            span: tracing::info_span!("fab.run", run_id = %run_id, project = %project.display()),
        }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, project: &Path, venv_name: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        project = %project.display(),
        venv = %venv_name,
    );
}

/// Emit event: phase transition.
pub fn emit_phase(phase: RunPhase) {
    info!(event = "run.phase", phase = %phase);
}

/// Emit event: run finished, with the number of tools that reported
/// findings or failed to start.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, tools_run: usize, tool_faults: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        tools_run = tools_run,
        tool_faults = tool_faults,
    );
}

/// Emit event: run aborted by a fatal error after `tools_finished` tools.
pub fn emit_run_aborted(run_id: &str, error: &dyn std::fmt::Display, tools_finished: usize) {
    warn!(
        event = "run.aborted",
        run_id = %run_id,
        error = %error,
        tools_finished = tools_finished,
    );
}

/// Emit event: a best-effort cleanup step failed.
pub fn emit_cleanup_fault(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.cleanup_fault", step = %step, error = %error);
}
