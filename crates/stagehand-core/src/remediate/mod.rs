//! The scan→fix loop across stages.
//!
//! Stages are walked in fixed order. Each stage is resolved fresh, then
//! handled on the route the resolver picked: locally, delegated to the
//! stage host over SSH, or through a CI workflow.

mod local;
mod remote;
mod workflow;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ci::WorkflowTrigger;
use crate::config::{EnvironmentConfig, StagehandConfig};
use crate::error::RemediationError;
use crate::exec::CommandRunner;
use crate::fix::{Fix, FixContext, FixRegistry};
use crate::provider::ProviderRegistry;
use crate::reachability::{self, Reachability, Route};
use crate::report::{FixOutcome, FixStatus, RemediationResult, StageReport};
use crate::scan::{Problem, ProblemSet};
use crate::signals::Signals;
use crate::types::{Severity, Stage};
use crate::workspace::Workspace;

/// What the run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Fix,
    /// Fix, then deploy when no critical gap remains.
    Deploy,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Fix => "fix",
            Action::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages to remediate and what to do with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub stages: BTreeSet<Stage>,
    pub action: Action,
}

impl Plan {
    pub fn new(stages: impl IntoIterator<Item = Stage>, action: Action) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            action,
        }
    }

    pub fn includes(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// The stage the run is for: the latest one planned. Earlier stages
    /// are prerequisites.
    pub fn target(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    /// Prerequisite stages are only fixed; deploying applies to the target.
    pub fn action_for(&self, stage: Stage) -> Action {
        match self.action {
            Action::Deploy if self.target() == Some(stage) => Action::Deploy,
            _ => Action::Fix,
        }
    }
}

pub struct Remediator<'a> {
    providers: &'a ProviderRegistry,
    fixes: &'a FixRegistry,
    config: &'a StagehandConfig,
    workspace: &'a Workspace,
    signals: &'a Signals,
    runner: &'a dyn CommandRunner,
    workflows: Option<&'a dyn WorkflowTrigger>,
    local_cli: Option<PathBuf>,
}

impl<'a> Remediator<'a> {
    pub fn new(
        providers: &'a ProviderRegistry,
        fixes: &'a FixRegistry,
        config: &'a StagehandConfig,
        workspace: &'a Workspace,
        signals: &'a Signals,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            providers,
            fixes,
            config,
            workspace,
            signals,
            runner,
            workflows: None,
            local_cli: None,
        }
    }

    pub fn with_workflows(mut self, workflows: Option<&'a dyn WorkflowTrigger>) -> Self {
        self.workflows = workflows;
        self
    }

    /// Binary uploaded to hosts that lack a compatible CLI.
    pub fn with_local_cli(mut self, path: Option<PathBuf>) -> Self {
        self.local_cli = path;
        self
    }

    pub(crate) fn fix_context(&self) -> FixContext<'_> {
        FixContext {
            config: self.config,
            workspace: self.workspace,
            signals: self.signals,
            runner: self.runner,
        }
    }

    pub fn remediate(&self, problems: &ProblemSet, plan: &Plan) -> RemediationResult {
        let mut outcomes = Vec::new();
        let mut reports = Vec::new();
        let mut secrets_gap: Option<String> = None;

        for stage in Stage::ALL.into_iter().filter(|s| plan.includes(*s)) {
            let action = plan.action_for(stage);
            let reach = reachability::resolve(self.providers, stage, self.config, self.signals);
            tracing::info!(stage = %stage, reachability = %reach, "remediating stage");

            let mut report = StageReport::new(stage, reach.clone());
            if stage.is_remote() {
                report.upstream_gap = secrets_gap.clone();
            }

            let stage_outcomes = match &reach {
                Reachability::Unreachable { reason, hint } => {
                    self.unreachable(stage, problems, reason, hint.as_deref())
                }
                Reachability::Reachable {
                    via: Route::Local | Route::Api,
                } => {
                    self.run_local(stage, problems, action, &mut report)
                }
                Reachability::Reachable { via: Route::Ssh } => {
                    self.run_ssh(stage, action, &mut report)
                }
                Reachability::Reachable { via: Route::Workflow } => {
                    self.run_workflow(stage, problems, action, &mut report)
                }
            };

            if stage == Stage::Secrets {
                secrets_gap = upstream_gap(&stage_outcomes);
            }

            outcomes.extend(stage_outcomes);
            reports.push(report);
        }

        let result = RemediationResult::aggregate(outcomes, reports);
        tracing::info!(
            fixed = result.totals.fixed,
            manual = result.totals.manual,
            failed = result.totals.failed,
            "remediation finished"
        );
        result
    }

    fn unreachable(
        &self,
        stage: Stage,
        problems: &ProblemSet,
        reason: &str,
        hint: Option<&str>,
    ) -> Vec<FixOutcome> {
        let error = RemediationError::UnreachableStage {
            stage,
            reason: reason.to_string(),
            hint: hint.map(str::to_string),
        }
        .to_string();
        let ctx = self.fix_context();

        self.stage_fixes(stage, problems)
            .into_iter()
            .map(|fix| {
                FixOutcome::new(fix.id(), stage, fix.severity(), FixStatus::Manual)
                    .with_error(error.clone())
                    .with_hint(fix.manual_instructions(&ctx))
            })
            .collect()
    }

    /// Problem fixes followed by deferred fixes, in registration order.
    fn stage_fixes(&self, stage: Stage, problems: &ProblemSet) -> Vec<&'a dyn Fix> {
        let wanted: Vec<&str> = problems
            .problems(stage)
            .iter()
            .map(|p| p.fix_id.as_str())
            .chain(problems.deferred(stage).iter().map(String::as_str))
            .collect();
        self.fixes
            .for_stage(stage)
            .filter(|f| wanted.contains(&f.id()))
            .collect()
    }

    /// The environment a remote stage is delivered through.
    pub(crate) fn primary_environment(&self, stage: Stage) -> Option<&'a EnvironmentConfig> {
        if let Some(execution) = &self.config.execution
            && execution.stage == stage
            && let Some(env) = self.config.environment(&execution.environment)
        {
            return Some(env);
        }
        self.config.environments_for(stage).next()
    }
}

fn upstream_gap(secrets: &[FixOutcome]) -> Option<String> {
    let blocking: Vec<&str> = secrets
        .iter()
        .filter(|o| {
            o.status == FixStatus::Failed
                || (o.status == FixStatus::Manual && o.severity.is_blocking())
        })
        .map(|o| o.id.as_str())
        .collect();
    if blocking.is_empty() {
        None
    } else {
        Some(format!(
            "secrets stage has unresolved critical gaps: {}",
            blocking.join(", ")
        ))
    }
}

/// Outcome standing in for a whole stage when no per-fix result exists.
pub(crate) fn stage_outcome(
    prefix: &str,
    stage: Stage,
    status: FixStatus,
    error: impl Into<String>,
) -> FixOutcome {
    FixOutcome::new(format!("{}:{}", prefix, stage), stage, Severity::Critical, status)
        .with_error(error)
}

pub(crate) fn problem_outcome(problem: &Problem, status: FixStatus) -> FixOutcome {
    FixOutcome::new(problem.fix_id.clone(), problem.stage, problem.severity, status)
}
