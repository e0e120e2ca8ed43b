//! Structured observability hooks for pipeline runs.
//!
//! - `OperationSpan`: an operation-scoped tracing span
//! - `emit_*`: one `info!` event per pipeline milestone, tagged with `event = "..."`
//!
//! Filter with `RUST_LOG`, e.g. `RUST_LOG=branchflow_core=debug`.

use std::future::Future;

use tracing::{info, warn, Instrument};

/// Span covering one pipeline invocation.
///
/// Unlike an entered guard this can be attached to a future, so the span
/// follows the run across await points.
pub struct OperationSpan {
    span: tracing::Span,
}

impl OperationSpan {
    /// Create a span tagged with the operation name and a fresh run id.
    pub fn new(operation: &str) -> Self {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("branchflow.op", operation = %operation, run_id = %run_id);
        Self { span }
    }

    /// Run `fut` inside the span.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        fut.instrument(self.span).await
    }
}

/// Emit event: pipeline started.
pub fn emit_pipeline_started(operation: &str, auto_resolve: bool) {
    info!(event = "pipeline.started", operation = %operation, auto_resolve = auto_resolve);
}

/// Emit event: pre-checks evaluated.
pub fn emit_precheck(operation: &str, total: usize, failed: usize, recoverable: usize) {
    info!(
        event = "pipeline.precheck",
        operation = %operation,
        total = total,
        failed = failed,
        recoverable = recoverable,
    );
}

/// Emit event: pipeline stopped before mutating (elicitation, choice, or failure).
pub fn emit_pipeline_halted(operation: &str, phase: &str, reason: &str) {
    info!(event = "pipeline.halted", operation = %operation, phase = %phase, reason = %reason);
}

/// Emit event: mutation finished.
pub fn emit_mutated(operation: &str, ok: bool) {
    info!(event = "pipeline.mutated", operation = %operation, ok = ok);
}

/// Emit event: pipeline finished with a report.
pub fn emit_pipeline_finished(operation: &str, success: bool, post_failures: usize) {
    info!(
        event = "pipeline.finished",
        operation = %operation,
        success = success,
        post_failures = post_failures,
    );
}

/// Emit event: one ship step reached.
pub fn emit_ship_step(branch: &str, step: &str) {
    info!(event = "ship.step", branch = %branch, step = %step);
}

/// Emit event: cleanup after merge failed (warning level).
pub fn emit_cleanup_warning(branch: &str, error: &dyn std::fmt::Display) {
    warn!(event = "ship.cleanup_failed", branch = %branch, error = %error);
}
