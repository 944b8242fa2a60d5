//! Configuration schema for stagehand.toml
//!
//! One file per workspace. Operator machines carry the full environment
//! list; remote hosts receive a minimal copy with an `[execution]` table
//! naming the stage and environment they serve.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::Stage;

/// Root configuration structure for stagehand.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagehandConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub vault: VaultConfig,

    /// CI workflow used as the fallback route to remote stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiConfig>,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Deployment environments, each bound to one remote stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentConfig>,

    /// Identity of a remote host (ONLY written by remote bootstrap)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Password file; defaults to ~/.stagehand/vault_password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    /// Environment variable holding the vault password
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            password_file: None,
            password_env: default_password_env(),
        }
    }
}

fn default_password_env() -> String {
    "STAGEHAND_VAULT_PASSWORD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiConfig {
    /// GitHub repository as "owner/repo"
    pub repository: String,

    /// Workflow file name or numeric id
    #[serde(default = "default_workflow")]
    pub workflow: String,

    #[serde(default = "default_git_ref")]
    pub git_ref: String,

    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_workflow() -> String {
    "stagehand.yml".to_string()
}

fn default_git_ref() -> String {
    "main".to_string()
}

fn default_api_url() -> Url {
    Url::parse("https://api.github.com").expect("static URL is valid")
}

pub(crate) fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    15 * 60
}

impl CiConfig {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            workflow: default_workflow(),
            git_ref: default_git_ref(),
            api_url: default_api_url(),
            token_env: default_token_env(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Split `repository` into owner and repo.
    pub fn owner_repo(&self) -> anyhow::Result<(&str, &str)> {
        match self.repository.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok((owner, repo))
            }
            _ => anyhow::bail!(
                "Invalid CI repository '{}': expected 'owner/repo'",
                self.repository
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote host preparation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_runtime_check")]
    pub runtime_check: String,

    #[serde(default = "default_runtime_install")]
    pub runtime_install: String,

    /// Semver requirement for the remote stagehand binary
    #[serde(default = "default_cli_version")]
    pub cli_version: String,

    /// Install command for the CLI; when unset the local binary is uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_install: Option<String>,

    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    #[serde(default = "default_remote_bin_dir")]
    pub remote_bin_dir: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            runtime_check: default_runtime_check(),
            runtime_install: default_runtime_install(),
            cli_version: default_cli_version(),
            cli_install: None,
            remote_dir: default_remote_dir(),
            remote_bin_dir: default_remote_bin_dir(),
        }
    }
}

fn default_runtime_check() -> String {
    "docker --version".to_string()
}

fn default_runtime_install() -> String {
    "curl -fsSL https://get.docker.com | sh".to_string()
}

fn default_cli_version() -> String {
    format!("^{}", env!("CARGO_PKG_VERSION"))
}

fn default_remote_dir() -> String {
    "~/stagehand".to_string()
}

fn default_remote_bin_dir() -> String {
    "~/.local/bin".to_string()
}

impl BootstrapConfig {
    pub fn cli_requirement(&self) -> anyhow::Result<semver::VersionReq> {
        semver::VersionReq::parse(&self.cli_version).map_err(|e| {
            anyhow::anyhow!(
                "Invalid bootstrap.cli_version '{}': {}",
                self.cli_version,
                e
            )
        })
    }
}

/// One deployment target bound to a remote stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,

    pub stage: Stage,

    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Name of the provider that owns this environment's pipeline
    #[serde(default = "default_pipeline")]
    pub pipeline: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_command: Option<String>,
}

fn default_pipeline() -> String {
    "ssh".to_string()
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>, stage: Stage, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage,
            host: host.into(),
            user: None,
            port: None,
            pipeline: default_pipeline(),
            deploy_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub stage: Stage,
    pub environment: String,
}

impl StagehandConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration written for a fresh workspace.
    pub fn for_project(name: impl Into<String>) -> Self {
        Self {
            project: ProjectConfig { name: name.into() },
            ..Self::default()
        }
    }

    pub fn environments_for(&self, stage: Stage) -> impl Iterator<Item = &EnvironmentConfig> {
        self.environments.iter().filter(move |e| e.stage == stage)
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for env in &self.environments {
            if env.name.trim().is_empty() {
                anyhow::bail!("Environment entries must have a name");
            }
            if !seen.insert(env.name.as_str()) {
                anyhow::bail!("Duplicate environment name: {}", env.name);
            }
            if !env.stage.is_remote() {
                anyhow::bail!(
                    "Environment '{}' targets stage '{}': only staging and prod take environments",
                    env.name,
                    env.stage
                );
            }
            if env.pipeline.trim().is_empty() {
                anyhow::bail!("Environment '{}' has an empty pipeline tag", env.name);
            }
        }

        if let Some(ci) = &self.ci {
            ci.owner_repo()?;
            if ci.poll_interval_secs == 0 {
                anyhow::bail!("ci.poll_interval_secs must be greater than zero");
            }
        }

        self.bootstrap.cli_requirement()?;

        if let Some(execution) = &self.execution
            && self.environment(&execution.environment).is_none()
        {
            anyhow::bail!(
                "execution.environment '{}' is not a configured environment",
                execution.environment
            );
        }

        Ok(())
    }
}
