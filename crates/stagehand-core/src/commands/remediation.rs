//! Scan, fix and deploy commands.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;

use crate::ci::{BlockingWorkflows, GitHubActionsClient, WorkflowTrigger};
use crate::config::StagehandConfig;
use crate::context::AppContext;
use crate::exec::{CommandRunner, SystemRunner};
use crate::fix::{FixContext, FixRegistry};
use crate::provider::ProviderRegistry;
use crate::reachability;
use crate::remediate::{Action, Plan, Remediator};
use crate::report::{RemediationResult, ScanEntry, ScanReport, StageScan};
use crate::scan::{self, ProblemSet};
use crate::signals::Signals;
use crate::types::Stage;
use crate::workspace::Workspace;

/// Which stages a fix run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageSelection {
    /// The stage plus its prerequisites (operator mode only).
    #[default]
    WithPrerequisites,
    /// Exactly the named stage.
    OnlyStage,
}

/// Outcome of a command against one target stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun<T> {
    /// The target stage resolved to a reachable route
    pub handled: bool,
    pub result: T,
}

pub struct RemediationEngine {
    config: StagehandConfig,
    workspace: Workspace,
    signals: Signals,
    providers: ProviderRegistry,
    fixes: FixRegistry,
    runner: Box<dyn CommandRunner>,
    workflows: Option<Box<dyn WorkflowTrigger>>,
    local_cli: Option<PathBuf>,
}

impl RemediationEngine {
    /// Build the engine for a real invocation: config from disk, signals
    /// from the process environment, system process runner.
    pub fn from_context(ctx: &AppContext) -> anyhow::Result<Self> {
        let workspace = ctx.workspace();
        let config = workspace
            .config_store()
            .load()
            .context("Failed to load stagehand configuration")?;
        let signals = Signals::capture(&config, ctx.mode(), ctx.home_dir().to_path_buf());

        let workflows: Option<Box<dyn WorkflowTrigger>> =
            match (config.ci.as_ref(), signals.ci_token()) {
                (Some(ci), Some(token)) => {
                    let client = GitHubActionsClient::new(ci, token)?;
                    Some(Box::new(BlockingWorkflows::new(client)?))
                }
                _ => None,
            };

        let engine = Self::with_parts(
            config,
            workspace,
            signals,
            ProviderRegistry::with_default_providers(),
            Box::new(SystemRunner),
        )?
        .with_local_cli(ctx.local_cli().map(|p| p.to_path_buf()));

        Ok(match workflows {
            Some(workflows) => engine.with_workflows(workflows),
            None => engine,
        })
    }

    /// Build the engine from explicit parts.
    pub fn with_parts(
        config: StagehandConfig,
        workspace: Workspace,
        signals: Signals,
        providers: ProviderRegistry,
        runner: Box<dyn CommandRunner>,
    ) -> anyhow::Result<Self> {
        let fixes = FixRegistry::from_providers(&providers, &config)?;
        tracing::debug!(fixes = fixes.len(), "fix registry built");
        Ok(Self {
            config,
            workspace,
            signals,
            providers,
            fixes,
            runner,
            workflows: None,
            local_cli: None,
        })
    }

    pub fn with_workflows(mut self, workflows: Box<dyn WorkflowTrigger>) -> Self {
        self.workflows = Some(workflows);
        self
    }

    pub fn with_local_cli(mut self, path: Option<PathBuf>) -> Self {
        self.local_cli = path;
        self
    }

    pub fn config(&self) -> &StagehandConfig {
        &self.config
    }

    pub fn fixes(&self) -> &FixRegistry {
        &self.fixes
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    fn fix_context(&self) -> FixContext<'_> {
        FixContext {
            config: &self.config,
            workspace: &self.workspace,
            signals: &self.signals,
            runner: self.runner.as_ref(),
        }
    }

    fn scan_all(&self) -> ProblemSet {
        scan::scan(&self.fixes, &self.fix_context())
    }

    /// Scan every stage, or only `stage`.
    pub fn scan_stage(&self, stage: Option<Stage>) -> StageRun<ScanReport> {
        let problems = self.scan_all();
        let ctx = self.fix_context();

        let stages = Stage::ALL
            .into_iter()
            .filter(|s| stage.is_none_or(|wanted| wanted == *s))
            .map(|s| StageScan {
                stage: s,
                reachability: reachability::resolve(&self.providers, s, &self.config, &self.signals),
                problems: problems
                    .problems(s)
                    .iter()
                    .map(|p| ScanEntry {
                        id: p.fix_id.clone(),
                        severity: p.severity,
                        description: p.description.clone(),
                        details: p.details.clone(),
                        manual: self
                            .fixes
                            .get(&p.fix_id)
                            .map(|f| f.manual_instructions(&ctx))
                            .unwrap_or_default(),
                    })
                    .collect(),
                deferred: problems.deferred(s).to_vec(),
            })
            .collect::<Vec<_>>();

        let handled = match stage {
            Some(target) => stages
                .iter()
                .any(|s| s.stage == target && s.reachability.is_reachable()),
            None => stages.iter().any(|s| s.reachability.is_reachable()),
        };

        StageRun {
            handled,
            result: ScanReport {
                generated_at: Utc::now(),
                stages,
            },
        }
    }

    /// Remediate `stage` (and, unless `OnlyStage`, its prerequisites).
    pub fn fix_stage(
        &self,
        stage: Stage,
        selection: StageSelection,
    ) -> StageRun<RemediationResult> {
        self.run(stage, selection, Action::Fix)
    }

    /// Remediate, then deploy `stage` when no critical gap remains.
    pub fn deploy_stage(&self, stage: Stage) -> StageRun<RemediationResult> {
        self.run(stage, StageSelection::WithPrerequisites, Action::Deploy)
    }

    fn run(&self, stage: Stage, selection: StageSelection, action: Action) -> StageRun<RemediationResult> {
        let plan = Plan::new(self.plan_stages(stage, selection), action);
        tracing::info!(stage = %stage, %action, stages = ?plan.stages, "starting run");

        let problems = self.scan_all();
        let remediator = Remediator::new(
            &self.providers,
            &self.fixes,
            &self.config,
            &self.workspace,
            &self.signals,
            self.runner.as_ref(),
        )
        .with_workflows(self.workflows.as_deref())
        .with_local_cli(self.local_cli.clone());

        let result = remediator.remediate(&problems, &plan);
        let handled = result
            .stage(stage)
            .is_some_and(|s| s.reachability.is_reachable());

        StageRun { handled, result }
    }

    fn plan_stages(&self, stage: Stage, selection: StageSelection) -> Vec<Stage> {
        let mut stages = vec![stage];
        if selection == StageSelection::WithPrerequisites && !self.signals.is_on_target() {
            stages.extend_from_slice(stage.prerequisites());
        }
        stages
    }
}
