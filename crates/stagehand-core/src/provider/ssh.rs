//! SSH provider: remote stages whose environments use `pipeline = "ssh"`.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context;

use crate::config::StagehandConfig;
use crate::exec::CommandSpec;
use crate::fix::{Fix, FixContext, ScanFinding};
use crate::reachability::{self, Reachability};
use crate::signals::Signals;
use crate::types::{Severity, Stage};

use super::Provider;

pub const PIPELINE: &str = "ssh";

#[derive(Debug, Default)]
pub struct SshProvider;

impl SshProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for SshProvider {
    fn name(&self) -> &'static str {
        PIPELINE
    }

    fn owned_stages(&self) -> &'static [Stage] {
        &[Stage::Staging, Stage::Prod]
    }

    fn fixes(&self, config: &StagehandConfig) -> Vec<Box<dyn Fix>> {
        let mut fixes: Vec<Box<dyn Fix>> = Vec::new();
        for stage in [Stage::Staging, Stage::Prod] {
            if !config.environments_for(stage).any(|e| e.pipeline == PIPELINE) {
                continue;
            }
            fixes.push(Box::new(EnvironmentHostFix::new(stage)));
            fixes.push(Box::new(ContainerRuntimeFix::new(stage)));
            fixes.push(Box::new(StageEnvFileFix::new(stage)));
        }
        fixes
    }

    fn resolve(&self, stage: Stage, config: &StagehandConfig, signals: &Signals) -> Reachability {
        reachability::resolve_remote(stage, config, signals, PIPELINE)
    }
}

/// Every environment of the stage names a host.
struct EnvironmentHostFix {
    stage: Stage,
    id: String,
}

impl EnvironmentHostFix {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            id: format!("environment-host-{}", stage),
        }
    }

    fn missing(&self, config: &StagehandConfig) -> Vec<String> {
        config
            .environments_for(self.stage)
            .filter(|e| e.host.trim().is_empty())
            .map(|e| e.name.clone())
            .collect()
    }
}

impl Fix for EnvironmentHostFix {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn description(&self) -> &str {
        "every environment has a host"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let missing = self.missing(ctx.config);
        if missing.is_empty() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!(
                "no host for environment(s): {}",
                missing.join(", ")
            )))
        }
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "set `host` for {} in stagehand.toml",
            self.missing(ctx.config).join(", ")
        )
    }
}

/// Container runtime on the stage host.
struct ContainerRuntimeFix {
    stage: Stage,
    id: String,
}

impl ContainerRuntimeFix {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            id: format!("container-runtime-{}", stage),
        }
    }
}

impl Fix for ContainerRuntimeFix {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn description(&self) -> &str {
        "container runtime is installed"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let check = &ctx.config.bootstrap.runtime_check;
        let output = ctx.runner.run(&CommandSpec::shell(check.as_str()))?;
        if output.success() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!(
                "`{}` failed: {}",
                check,
                output.summary()
            )))
        }
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "install a container runtime on the {} host: {}",
            self.stage, ctx.config.bootstrap.runtime_install
        )
    }

    fn on_target(&self) -> bool {
        true
    }
}

/// `.env.<stage>` in the working directory.
struct StageEnvFileFix {
    stage: Stage,
    id: String,
}

impl StageEnvFileFix {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            id: format!("stage-env-file-{}", stage),
        }
    }

    fn path(&self, ctx: &FixContext<'_>) -> PathBuf {
        ctx.workspace.root().join(format!(".env.{}", self.stage))
    }

    fn create(&self, ctx: &FixContext<'_>) -> anyhow::Result<bool> {
        let path = self.path(ctx);
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(true)
    }
}

impl Fix for StageEnvFileFix {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &str {
        "stage env file exists"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let path = self.path(ctx);
        if path.is_file() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!("{} does not exist", path.display())))
        }
    }

    fn correct(&self, ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        Some(self.create(ctx))
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "create {} (mode 600) with the stage's environment variables",
            self.path(ctx).display()
        )
    }

    fn on_target(&self) -> bool {
        true
    }
}
