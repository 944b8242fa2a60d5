//! Local route: corrections run on this machine.

use crate::error::RemediationError;
use crate::exec::CommandSpec;
use crate::report::{FixOutcome, FixStatus, StageReport};
use crate::scan::{ProblemSet, scan_fix};
use crate::types::{Severity, Stage};

use super::{Action, Remediator, problem_outcome};

impl Remediator<'_> {
    pub(super) fn run_local(
        &self,
        stage: Stage,
        problems: &ProblemSet,
        action: Action,
        report: &mut StageReport,
    ) -> Vec<FixOutcome> {
        let ctx = self.fix_context();
        let mut outcomes = Vec::new();

        for problem in problems.problems(stage) {
            let Some(fix) = self.fixes.get(&problem.fix_id) else {
                continue;
            };

            let outcome = match fix.correct(&ctx) {
                None => {
                    let outcome = problem_outcome(problem, FixStatus::Manual)
                        .with_hint(fix.manual_instructions(&ctx));
                    match &problem.fault {
                        Some(fault) => outcome.with_error(fault.to_string()),
                        None => outcome,
                    }
                }
                Some(Err(e)) => problem_outcome(problem, FixStatus::Failed)
                    .with_error(
                        RemediationError::CorrectionFailure {
                            fix: fix.id().to_string(),
                            message: format!("{:#}", e),
                        }
                        .to_string(),
                    )
                    .with_hint(fix.manual_instructions(&ctx)),
                Some(Ok(false)) => problem_outcome(problem, FixStatus::Failed)
                    .with_error(
                        RemediationError::CorrectionFailure {
                            fix: fix.id().to_string(),
                            message: "correction reported failure".to_string(),
                        }
                        .to_string(),
                    )
                    .with_hint(fix.manual_instructions(&ctx)),
                Some(Ok(true)) => match scan_fix(fix, &ctx) {
                    None => problem_outcome(problem, FixStatus::Fixed),
                    Some(still) => problem_outcome(problem, FixStatus::Failed)
                        .with_error(
                            RemediationError::CorrectionFailure {
                                fix: fix.id().to_string(),
                                message: format!("still reports a problem: {}", still.details),
                            }
                            .to_string(),
                        )
                        .with_hint(fix.manual_instructions(&ctx)),
                },
            };

            tracing::info!(stage = %stage, fix = fix.id(), status = ?outcome.status, "fix applied");
            outcomes.push(outcome);
        }

        for id in problems.deferred(stage) {
            let Some(fix) = self.fixes.get(id) else {
                continue;
            };
            outcomes.push(
                FixOutcome::new(fix.id(), stage, fix.severity(), FixStatus::Manual)
                    .with_error(format!("{} can only be checked on the {} host", fix.id(), stage))
                    .with_hint(format!(
                        "run `stagehand fix {} --only-stage --on-target` on the {} host",
                        stage, stage
                    )),
            );
        }

        if action == Action::Deploy {
            let deploy = self.deploy_local(stage, &outcomes, report);
            outcomes.push(deploy);
        }

        outcomes
    }

    fn deploy_local(
        &self,
        stage: Stage,
        outcomes: &[FixOutcome],
        report: &mut StageReport,
    ) -> FixOutcome {
        let blocking: Vec<&str> = outcomes
            .iter()
            .filter(|o| {
                o.status == FixStatus::Failed
                    || (o.status == FixStatus::Manual && o.severity.is_blocking())
            })
            .map(|o| o.id.as_str())
            .collect();
        if !blocking.is_empty() {
            return FixOutcome::new("deploy", stage, Severity::Critical, FixStatus::Manual)
                .with_error(format!(
                    "deploy skipped: critical gaps remain ({})",
                    blocking.join(", ")
                ));
        }

        let Some(env) = self.primary_environment(stage) else {
            return FixOutcome::new("deploy", stage, Severity::Critical, FixStatus::Manual)
                .with_error(format!("no environment configured for {}", stage))
                .with_hint(format!(
                    "add an [[environments]] entry with stage = \"{}\"",
                    stage
                ));
        };

        let Some(command) = env.deploy_command.as_deref().filter(|c| !c.trim().is_empty())
        else {
            return FixOutcome::new("deploy", stage, Severity::Critical, FixStatus::Manual)
                .with_error(format!("environment '{}' has no deploy_command", env.name))
                .with_hint(format!(
                    "set deploy_command for environment '{}' in stagehand.toml",
                    env.name
                ));
        };

        tracing::info!(stage = %stage, environment = %env.name, command, "deploying");
        let spec = CommandSpec::shell(command).current_dir(self.workspace.root());
        match self.runner.run(&spec) {
            Ok(output) if output.success() => {
                report
                    .notes
                    .push(format!("deployed environment '{}'", env.name));
                FixOutcome::new("deploy", stage, Severity::Critical, FixStatus::Fixed)
            }
            Ok(output) => FixOutcome::new("deploy", stage, Severity::Critical, FixStatus::Failed)
                .with_error(format!("`{}` failed: {}", command, output.summary())),
            Err(e) => FixOutcome::new("deploy", stage, Severity::Critical, FixStatus::Failed)
                .with_error(format!("{:#}", e)),
        }
    }
}
