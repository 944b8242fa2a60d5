//! GitHub provider: contributes checks only, owns no stage.

use crate::config::StagehandConfig;
use crate::fix::{Fix, FixContext, ScanFinding};
use crate::types::{Severity, Stage};

use super::Provider;

#[derive(Debug, Default)]
pub struct GitHubProvider;

impl GitHubProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn fixes(&self, config: &StagehandConfig) -> Vec<Box<dyn Fix>> {
        match &config.ci {
            Some(_) => vec![Box::new(CiWorkflowFix)],
            None => Vec::new(),
        }
    }
}

struct CiWorkflowFix;

impl CiWorkflowFix {
    fn relative_path(config: &StagehandConfig) -> String {
        let workflow = config
            .ci
            .as_ref()
            .map(|ci| ci.workflow.as_str())
            .unwrap_or("stagehand.yml");
        format!(".github/workflows/{}", workflow)
    }
}

impl Fix for CiWorkflowFix {
    fn id(&self) -> &str {
        "ci-workflow"
    }

    fn stage(&self) -> Stage {
        Stage::Dev
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &str {
        "CI workflow file is committed"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let relative = Self::relative_path(ctx.config);
        if ctx.workspace.root().join(&relative).is_file() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!("{} not found", relative)))
        }
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "add {} with a workflow_dispatch trigger taking `stage` and `action` inputs",
            Self::relative_path(ctx.config)
        )
    }
}
