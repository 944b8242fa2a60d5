//! Core provider: the operator workspace itself.

use crate::config::{STATE_DIR_NAME, StagehandConfig};
use crate::fix::{Fix, FixContext, ScanFinding};
use crate::reachability::{self, Reachability};
use crate::signals::Signals;
use crate::types::{Severity, Stage};
use crate::workspace::{ensure_gitignore_entry, gitignore_has_entry, is_valid_slug};

use super::Provider;

#[derive(Debug, Default)]
pub struct CoreProvider;

impl CoreProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for CoreProvider {
    fn name(&self) -> &'static str {
        "core"
    }

    fn owned_stages(&self) -> &'static [Stage] {
        &[Stage::Dev]
    }

    fn fixes(&self, _config: &StagehandConfig) -> Vec<Box<dyn Fix>> {
        vec![
            Box::new(BaseConfigFix),
            Box::new(ProjectNameFix),
            Box::new(StateDirIgnoredFix),
            Box::new(GitRepositoryFix),
        ]
    }

    fn resolve(&self, _stage: Stage, _config: &StagehandConfig, _signals: &Signals) -> Reachability {
        reachability::resolve_dev()
    }
}

fn state_dir_entry() -> String {
    format!("{}/", STATE_DIR_NAME)
}

/// stagehand.toml exists.
struct BaseConfigFix;

impl Fix for BaseConfigFix {
    fn id(&self) -> &str {
        "base-config"
    }

    fn stage(&self) -> Stage {
        Stage::Dev
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn description(&self) -> &str {
        "stagehand.toml exists"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let store = ctx.workspace.config_store();
        if store.exists() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!(
                "{} not found",
                store.config_path().display()
            )))
        }
    }

    fn correct(&self, ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        let store = ctx.workspace.config_store();
        if store.exists() {
            return Some(Ok(true));
        }
        let config = StagehandConfig::for_project(ctx.workspace.default_project_name());
        Some(store.save(&config).map(|()| true))
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "create {} or run `stagehand fix dev`",
            ctx.workspace.config_store().config_path().display()
        )
    }
}

struct ProjectNameFix;

impl Fix for ProjectNameFix {
    fn id(&self) -> &str {
        "project-name"
    }

    fn stage(&self) -> Stage {
        Stage::Dev
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &str {
        "project.name is a valid slug"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let config = ctx.saved_config()?;
        let name = &config.project.name;
        if is_valid_slug(name) {
            Ok(ScanFinding::Clean)
        } else if name.is_empty() {
            Ok(ScanFinding::problem("project.name is empty"))
        } else {
            Ok(ScanFinding::problem(format!(
                "project.name '{}' must be lowercase letters, digits and dashes",
                name
            )))
        }
    }

    fn correct(&self, ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        Some(derive_project_name(ctx))
    }

    fn manual_instructions(&self, _ctx: &FixContext<'_>) -> String {
        "set [project] name = \"<slug>\" in stagehand.toml".to_string()
    }
}

fn derive_project_name(ctx: &FixContext<'_>) -> anyhow::Result<bool> {
    let store = ctx.workspace.config_store();
    let mut config = store.load()?;
    if is_valid_slug(&config.project.name) {
        return Ok(true);
    }
    config.project.name = ctx.workspace.default_project_name();
    tracing::info!(name = %config.project.name, "setting project name");
    store.save(&config)?;
    Ok(true)
}

struct StateDirIgnoredFix;

impl Fix for StateDirIgnoredFix {
    fn id(&self) -> &str {
        "state-dir-ignored"
    }

    fn stage(&self) -> Stage {
        Stage::Dev
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &str {
        ".gitignore lists the state directory"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let entry = state_dir_entry();
        if gitignore_has_entry(ctx.workspace.root(), &entry)? {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!("{} is not ignored", entry)))
        }
    }

    fn correct(&self, ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        Some(ensure_gitignore_entry(ctx.workspace.root(), &state_dir_entry()).map(|()| true))
    }

    fn manual_instructions(&self, _ctx: &FixContext<'_>) -> String {
        format!("add `{}` to .gitignore", state_dir_entry())
    }
}

struct GitRepositoryFix;

impl Fix for GitRepositoryFix {
    fn id(&self) -> &str {
        "git-repository"
    }

    fn stage(&self) -> Stage {
        Stage::Dev
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &str {
        "workspace is a git repository"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        match git2::Repository::discover(ctx.workspace.root()) {
            Ok(_) => Ok(ScanFinding::Clean),
            Err(_) => Ok(ScanFinding::problem(format!(
                "{} is not inside a git repository",
                ctx.workspace.root().display()
            ))),
        }
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!("run `git init` in {}", ctx.workspace.root().display())
    }
}
