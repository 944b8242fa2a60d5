//! Remote host preparation before delegating a stage.
//!
//! Each step checks first and only acts when the check fails, so running
//! the bootstrap against an already-prepared host changes nothing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{EnvironmentConfig, ExecutionConfig, StagehandConfig, parser, paths};
use crate::error::RemediationError;
use crate::ssh::{SshSession, remote_join, remote_path};
use crate::types::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapStep {
    Runtime,
    Cli,
    Workdir,
    StageConfig,
}

impl BootstrapStep {
    pub const ALL: [BootstrapStep; 4] = [
        BootstrapStep::Runtime,
        BootstrapStep::Cli,
        BootstrapStep::Workdir,
        BootstrapStep::StageConfig,
    ];
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootstrapStep::Runtime => "runtime",
            BootstrapStep::Cli => "cli",
            BootstrapStep::Workdir => "workdir",
            BootstrapStep::StageConfig => "stage-config",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    /// Check passed, nothing done
    AlreadySatisfied,
    /// Check failed and the step acted
    Applied,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub steps: Vec<(BootstrapStep, StepAction)>,
}

impl BootstrapReport {
    /// Whether any step had to change the host.
    pub fn changed(&self) -> bool {
        self.steps
            .iter()
            .any(|(_, action)| *action == StepAction::Applied)
    }

    pub fn action(&self, step: BootstrapStep) -> Option<StepAction> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, action)| *action)
    }
}

/// Prepares one environment of a remote stage.
pub struct RemoteBootstrap<'a> {
    config: &'a StagehandConfig,
    environment: &'a EnvironmentConfig,
    stage: Stage,
    local_cli: Option<PathBuf>,
}

impl<'a> RemoteBootstrap<'a> {
    pub fn new(
        config: &'a StagehandConfig,
        environment: &'a EnvironmentConfig,
        stage: Stage,
    ) -> Self {
        Self {
            config,
            environment,
            stage,
            local_cli: None,
        }
    }

    /// Binary uploaded when the remote CLI is missing and no install
    /// command is configured.
    pub fn with_local_cli(mut self, path: Option<PathBuf>) -> Self {
        self.local_cli = path;
        self
    }

    pub fn run(&self, session: &SshSession<'_>) -> Result<BootstrapReport, RemediationError> {
        let mut report = BootstrapReport::default();
        for step in BootstrapStep::ALL {
            let action = match step {
                BootstrapStep::Runtime => self.ensure_runtime(session),
                BootstrapStep::Cli => self.ensure_cli(session),
                BootstrapStep::Workdir => self.ensure_workdir(session),
                BootstrapStep::StageConfig => self.ensure_stage_config(session),
            }
            .map_err(|e| RemediationError::BootstrapFailure {
                step,
                message: format!("{:#}", e),
            })?;

            tracing::debug!(
                stage = %self.stage,
                host = %self.environment.host,
                step = %step,
                ?action,
                "bootstrap step"
            );
            report.steps.push((step, action));
        }
        Ok(report)
    }

    fn ensure_runtime(&self, session: &SshSession<'_>) -> anyhow::Result<StepAction> {
        let bootstrap = &self.config.bootstrap;
        if session.exec(&bootstrap.runtime_check)?.success() {
            return Ok(StepAction::AlreadySatisfied);
        }

        tracing::info!(host = %self.environment.host, "installing container runtime");
        let install = session.exec(&bootstrap.runtime_install)?;
        if !install.success() {
            anyhow::bail!(
                "`{}` failed: {}",
                bootstrap.runtime_install,
                install.summary()
            );
        }

        let recheck = session.exec(&bootstrap.runtime_check)?;
        if !recheck.success() {
            anyhow::bail!(
                "`{}` still fails after install: {}",
                bootstrap.runtime_check,
                recheck.summary()
            );
        }
        Ok(StepAction::Applied)
    }

    fn ensure_cli(&self, session: &SshSession<'_>) -> anyhow::Result<StepAction> {
        let requirement = self.config.bootstrap.cli_requirement()?;
        if let Ok(version) = self.remote_cli_version(session)
            && requirement.matches(&version)
        {
            return Ok(StepAction::AlreadySatisfied);
        }

        let bin_dir = &self.config.bootstrap.remote_bin_dir;
        match self
            .config
            .bootstrap
            .cli_install
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(install) => {
                tracing::info!(host = %self.environment.host, "installing stagehand");
                let output = session.exec(install)?;
                if !output.success() {
                    anyhow::bail!("`{}` failed: {}", install, output.summary());
                }
            }
            None => {
                let local = self.local_cli.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "no local stagehand binary to upload; set bootstrap.cli_install"
                    )
                })?;
                tracing::info!(host = %self.environment.host, "uploading stagehand binary");

                let mkdir = session.exec(&format!("mkdir -p {}", remote_path(bin_dir)))?;
                if !mkdir.success() {
                    anyhow::bail!("cannot create {}: {}", bin_dir, mkdir.summary());
                }
                let target = remote_join(bin_dir, "stagehand");
                let upload = session.upload(local, &target)?;
                if !upload.success() {
                    anyhow::bail!("upload to {} failed: {}", target, upload.summary());
                }
                let chmod = session.exec(&format!("chmod 755 {}", remote_path(&target)))?;
                if !chmod.success() {
                    anyhow::bail!("chmod {} failed: {}", target, chmod.summary());
                }
            }
        }

        let version = self.remote_cli_version(session)?;
        if !requirement.matches(&version) {
            anyhow::bail!(
                "remote stagehand {} does not satisfy {}",
                version,
                requirement
            );
        }
        Ok(StepAction::Applied)
    }

    fn remote_cli_version(&self, session: &SshSession<'_>) -> anyhow::Result<semver::Version> {
        let script = format!(
            "export PATH={}:\"$PATH\"; stagehand --version",
            remote_path(&self.config.bootstrap.remote_bin_dir)
        );
        let output = session.exec(&script)?;
        if !output.success() {
            anyhow::bail!("stagehand not runnable: {}", output.summary());
        }
        parse_cli_version(&output.stdout)
    }

    fn ensure_workdir(&self, session: &SshSession<'_>) -> anyhow::Result<StepAction> {
        let dir = remote_path(&self.config.bootstrap.remote_dir);
        if session.exec(&format!("test -d {}", dir))?.success() {
            return Ok(StepAction::AlreadySatisfied);
        }
        let output = session.exec(&format!("mkdir -p {}", dir))?;
        if !output.success() {
            anyhow::bail!(
                "cannot create {}: {}",
                self.config.bootstrap.remote_dir,
                output.summary()
            );
        }
        Ok(StepAction::Applied)
    }

    fn ensure_stage_config(&self, session: &SshSession<'_>) -> anyhow::Result<StepAction> {
        let content = self.render_stage_config()?;
        let wanted = blake3::hash(content.as_bytes());
        let file = remote_path(&remote_join(
            &self.config.bootstrap.remote_dir,
            paths::CONFIG_FILE_NAME,
        ));

        let current = session.exec(&format!("cat {} 2>/dev/null", file))?;
        if current.success() && blake3::hash(current.stdout.as_bytes()) == wanted {
            return Ok(StepAction::AlreadySatisfied);
        }

        let output = session.exec_with_stdin(&format!("cat > {}", file), &content)?;
        if !output.success() {
            anyhow::bail!("cannot write {}: {}", file, output.summary());
        }
        Ok(StepAction::Applied)
    }

    /// Minimal config for the remote host: project, this environment and
    /// the execution marker.
    pub fn render_stage_config(&self) -> anyhow::Result<String> {
        let remote = StagehandConfig {
            project: self.config.project.clone(),
            bootstrap: self.config.bootstrap.clone(),
            environments: vec![self.environment.clone()],
            execution: Some(ExecutionConfig {
                stage: self.stage,
                environment: self.environment.name.clone(),
            }),
            ..StagehandConfig::default()
        };
        parser::to_toml(&remote)
    }
}

/// Parse `stagehand 0.1.0` (or a bare version) into a semver version.
pub fn parse_cli_version(output: &str) -> anyhow::Result<semver::Version> {
    let token = output
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow::anyhow!("empty version output"))?;
    semver::Version::parse(token.trim_start_matches('v'))
        .map_err(|e| anyhow::anyhow!("unparsable version '{}': {}", token, e))
}
