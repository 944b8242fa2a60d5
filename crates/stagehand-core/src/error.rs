//! Remediation failure taxonomy.
//!
//! Every variant is captured at the smallest scope (one fix or one stage)
//! and rendered into the outcome it belongs to; none of them aborts a run.

use crate::bootstrap::BootstrapStep;
use crate::types::Stage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemediationError {
    /// No viable route to the stage.
    #[error("stage {stage} is unreachable: {reason}{}", hint_suffix(.hint))]
    UnreachableStage {
        stage: Stage,
        reason: String,
        hint: Option<String>,
    },

    /// A scan predicate errored; the fix is treated as a present problem.
    #[error("scan of '{fix}' failed: {message}")]
    ScanFault { fix: String, message: String },

    /// A corrective action errored or reported failure.
    #[error("correction '{fix}' failed: {message}")]
    CorrectionFailure { fix: String, message: String },

    /// Remote preparation failed; delegation for the stage is skipped.
    #[error("remote bootstrap failed at step '{step}': {message}")]
    BootstrapFailure { step: BootstrapStep, message: String },

    /// The external workflow did not reach a terminal state in time.
    #[error(
        "workflow run {run_id} still running after {waited_secs}s; inconclusive - check external system: {url}"
    )]
    PollTimeout {
        run_id: u64,
        url: String,
        waited_secs: u64,
    },

    /// The delegated remote run did not produce a usable report.
    #[error("remote run on {host} produced no report: {message}")]
    RemoteReport { host: String, message: String },
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|h| format!(" (hint: {h})"))
        .unwrap_or_default()
}
