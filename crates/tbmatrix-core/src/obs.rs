//! Structured lifecycle events for matrix runs.
//!
//! Every event is an `info!` record carrying an `event` field, so JSON logs
//! can be filtered on it (`run.started`, `run.finished`, `matrix.finished`).

use crate::report::{MatrixReport, RunOutcome};
use tracing::info;

/// Span tagged with the run name, attached to the run's future with
/// [`tracing::Instrument`] so it follows the run across worker threads.
pub fn run_span(run_name: &str) -> tracing::Span {
    tracing::info_span!("tbmatrix.run", run = %run_name)
}

pub fn emit_run_started(run_name: &str, index: usize, digest: &str) {
    info!(event = "run.started", run = %run_name, index = index, digest = %digest);
}

pub fn emit_run_finished(run_name: &str, outcome: RunOutcome, duration_ms: u64) {
    info!(
        event = "run.finished",
        run = %run_name,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// Final counts for the whole invocation.
pub fn emit_matrix_finished(report: &MatrixReport) {
    info!(
        event = "matrix.finished",
        invocation_id = %report.invocation_id,
        attempted = report.attempted(),
        passed = report.passed_count(),
        failed = report.failed_count(),
        error = report.error_count(),
        duration_ms = report.duration_ms,
    );
}
