//! Workflow route: a CI runner remediates the stage.

use std::collections::BTreeMap;

use crate::ci::{PollPolicy, RunStatus, WaitOutcome, wait_for_completion};
use crate::error::RemediationError;
use crate::report::{FixOutcome, FixStatus, StageReport};
use crate::scan::ProblemSet;
use crate::types::Stage;

use super::{Action, Remediator, stage_outcome};

impl Remediator<'_> {
    pub(super) fn run_workflow(
        &self,
        stage: Stage,
        problems: &ProblemSet,
        action: Action,
        report: &mut StageReport,
    ) -> Vec<FixOutcome> {
        let (Some(ci), Some(workflows)) = (self.config.ci.as_ref(), self.workflows) else {
            return vec![stage_outcome(
                "workflow",
                stage,
                FixStatus::Failed,
                "CI workflow route selected but no CI client is available",
            )];
        };

        let inputs = BTreeMap::from([
            ("stage".to_string(), stage.to_string()),
            ("action".to_string(), action.to_string()),
        ]);

        let run = match workflows.trigger(&ci.workflow, &inputs) {
            Ok(run) => run,
            Err(e) => {
                return vec![stage_outcome(
                    "workflow",
                    stage,
                    FixStatus::Failed,
                    format!("failed to trigger {}: {:#}", ci.workflow, e),
                )];
            }
        };
        tracing::info!(stage = %stage, run_id = run.id, url = %run.url, "workflow triggered");

        match wait_for_completion(workflows, &run, PollPolicy::from_config(ci)) {
            Ok(WaitOutcome::Finished(RunStatus::Succeeded)) => {
                report
                    .notes
                    .push(format!("workflow run succeeded: {}", run.url));
                Vec::new()
            }
            Ok(WaitOutcome::Finished(status)) => {
                let conclusion = match status {
                    RunStatus::Failed { conclusion } => conclusion,
                    other => format!("{:?}", other),
                };
                vec![
                    stage_outcome(
                        "workflow",
                        stage,
                        FixStatus::Failed,
                        format!("workflow run concluded '{}'", conclusion),
                    )
                    .with_hint(run.url.clone()),
                ]
            }
            Ok(WaitOutcome::TimedOut { waited }) => {
                let error = RemediationError::PollTimeout {
                    run_id: run.id,
                    url: run.url.clone(),
                    waited_secs: waited.as_secs(),
                }
                .to_string();
                tracing::warn!(stage = %stage, "{}", error);

                let fixes = self.stage_fixes(stage, problems);
                if fixes.is_empty() {
                    return vec![
                        stage_outcome("workflow", stage, FixStatus::Manual, error)
                            .with_hint(run.url.clone()),
                    ];
                }
                fixes
                    .into_iter()
                    .map(|fix| {
                        FixOutcome::new(fix.id(), stage, fix.severity(), FixStatus::Manual)
                            .with_error(error.clone())
                            .with_hint(run.url.clone())
                    })
                    .collect()
            }
            Err(e) => vec![
                stage_outcome(
                    "workflow",
                    stage,
                    FixStatus::Failed,
                    format!("polling run {} failed: {:#}", run.id, e),
                )
                .with_hint(run.url.clone()),
            ],
        }
    }
}
