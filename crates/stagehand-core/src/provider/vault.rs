//! Vault provider: secret access and the deploy keys derived from it.

use std::path::Path;

use anyhow::Context;

use crate::config::StagehandConfig;
use crate::fix::{Fix, FixContext, ScanFinding};
use crate::reachability::{self, Reachability};
use crate::signals::Signals;
use crate::ssh::{deploy_key_comment, keygen_command};
use crate::types::{Severity, Stage};

use super::Provider;

#[derive(Debug, Default)]
pub struct VaultProvider;

impl VaultProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for VaultProvider {
    fn name(&self) -> &'static str {
        "vault"
    }

    fn owned_stages(&self) -> &'static [Stage] {
        &[Stage::Secrets]
    }

    fn fixes(&self, config: &StagehandConfig) -> Vec<Box<dyn Fix>> {
        let mut fixes: Vec<Box<dyn Fix>> =
            vec![Box::new(VaultPasswordFix), Box::new(VaultPasswordPermissionsFix)];

        for stage in [Stage::Staging, Stage::Prod] {
            if config.environments_for(stage).any(|e| e.pipeline == super::ssh::PIPELINE) {
                fixes.push(Box::new(DeployKeyFix::new(stage)));
            }
        }
        fixes
    }

    fn resolve(&self, _stage: Stage, config: &StagehandConfig, signals: &Signals) -> Reachability {
        reachability::resolve_secrets(config, signals)
    }
}

struct VaultPasswordFix;

impl Fix for VaultPasswordFix {
    fn id(&self) -> &str {
        "vault-password"
    }

    fn stage(&self) -> Stage {
        Stage::Secrets
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn description(&self) -> &str {
        "vault password is available"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        if ctx.signals.has_vault_password_env() {
            return Ok(ScanFinding::Clean);
        }
        let file = ctx.signals.vault_password_file(ctx.config);
        if file.is_file() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!(
                "{} is unset and {} does not exist",
                ctx.config.vault.password_env,
                file.display()
            )))
        }
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "export {} or write the vault password to {} with mode 600",
            ctx.config.vault.password_env,
            ctx.signals.vault_password_file(ctx.config).display()
        )
    }
}

struct VaultPasswordPermissionsFix;

impl Fix for VaultPasswordPermissionsFix {
    fn id(&self) -> &str {
        "vault-password-permissions"
    }

    fn stage(&self) -> Stage {
        Stage::Secrets
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &str {
        "vault password file is private"
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let file = ctx.signals.vault_password_file(ctx.config);
        if !file.is_file() {
            return Ok(ScanFinding::Clean);
        }
        match file_mode(&file)? {
            Some(mode) if mode != 0o600 => Ok(ScanFinding::problem(format!(
                "{} has mode {:o}",
                file.display(),
                mode
            ))),
            _ => Ok(ScanFinding::Clean),
        }
    }

    fn correct(&self, ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        let file = ctx.signals.vault_password_file(ctx.config);
        Some(set_private(&file).map(|()| true))
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        format!(
            "chmod 600 {}",
            ctx.signals.vault_password_file(ctx.config).display()
        )
    }
}

#[cfg(unix)]
fn file_mode(path: &Path) -> anyhow::Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(Some(meta.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> anyhow::Result<Option<u32>> {
    Ok(None)
}

#[cfg(unix)]
pub(crate) fn set_private(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
pub(crate) fn set_private(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

/// Stage-specific SSH deploy key.
struct DeployKeyFix {
    stage: Stage,
    id: String,
    description: String,
}

impl DeployKeyFix {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            id: format!("deploy-key-{}", stage),
            description: format!("{} deploy key exists", stage),
        }
    }

    fn comment(&self, config: &StagehandConfig) -> String {
        deploy_key_comment(&config.project.name, self.stage)
    }

    fn hosts(&self, config: &StagehandConfig) -> String {
        config
            .environments_for(self.stage)
            .map(|e| e.host.as_str())
            .filter(|h| !h.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn generate(&self, ctx: &FixContext<'_>) -> anyhow::Result<bool> {
        let key = ctx.signals.deploy_key(self.stage);
        if let Some(dir) = key.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        tracing::info!(stage = %self.stage, key = %key.display(), "generating deploy key");
        let output = ctx
            .runner
            .run(&keygen_command(&key, &self.comment(ctx.config)))?;
        if !output.success() {
            anyhow::bail!("ssh-keygen failed: {}", output.summary());
        }
        Ok(true)
    }
}

impl Fix for DeployKeyFix {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage(&self) -> Stage {
        Stage::Secrets
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding> {
        let key = ctx.signals.deploy_key(self.stage);
        if key.is_file() {
            Ok(ScanFinding::Clean)
        } else {
            Ok(ScanFinding::problem(format!("{} does not exist", key.display())))
        }
    }

    fn correct(&self, ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        Some(self.generate(ctx))
    }

    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String {
        let key = ctx.signals.deploy_key(self.stage);
        format!(
            "run `{}` and add {}.pub to authorized_keys on {}",
            keygen_command(&key, &self.comment(ctx.config)).display(),
            key.display(),
            self.hosts(ctx.config)
        )
    }
}
