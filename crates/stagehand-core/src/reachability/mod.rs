//! Stage reachability resolution.
//!
//! Resolution is a pure function of config plus [`Signals`]; the only
//! live inputs are file-existence checks, because corrections made earlier
//! in a run (deploy keys) must be visible to later stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::StagehandConfig;
use crate::provider::ProviderRegistry;
use crate::signals::Signals;
use crate::ssh::{deploy_key_comment, keygen_command};
use crate::types::Stage;

pub const NO_VAULT_PASSWORD: &str = "no vault password";
pub const NO_ENVIRONMENTS: &str = "no environments configured";
pub const OWNED_BY_OTHER: &str = "owned by another provider";
pub const NO_KEY_NO_TOKEN: &str = "no SSH key and no CI token";
pub const NO_OWNER: &str = "no provider owns this stage";

/// How code for a stage gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// This machine.
    Local,
    /// A remote host over a multiplexed SSH session.
    Ssh,
    /// An external CI workflow.
    Workflow,
    /// A provider API called from this machine.
    Api,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Route::Local => "local",
            Route::Ssh => "ssh",
            Route::Workflow => "workflow",
            Route::Api => "api",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Reachability {
    Reachable {
        via: Route,
    },
    Unreachable {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl Reachability {
    pub fn via(route: Route) -> Self {
        Reachability::Reachable { via: route }
    }

    pub fn unreachable(reason: impl Into<String>, hint: Option<String>) -> Self {
        Reachability::Unreachable {
            reason: reason.into(),
            hint,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable { .. })
    }

    pub fn route(&self) -> Option<Route> {
        match self {
            Reachability::Reachable { via } => Some(*via),
            Reachability::Unreachable { .. } => None,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Reachable { via } => write!(f, "reachable via {}", via),
            Reachability::Unreachable { reason, .. } => write!(f, "unreachable: {}", reason),
        }
    }
}

/// Resolve a stage through the provider that owns it.
pub fn resolve(
    providers: &ProviderRegistry,
    stage: Stage,
    config: &StagehandConfig,
    signals: &Signals,
) -> Reachability {
    let reachability = match providers.owner(stage, config) {
        Some(owner) => owner.resolve(stage, config, signals),
        None => Reachability::unreachable(
            NO_OWNER,
            Some(format!("register a provider that owns the {} stage", stage)),
        ),
    };
    tracing::debug!(stage = %stage, %reachability, "resolved stage");
    reachability
}

/// The operator's own machine.
pub fn resolve_dev() -> Reachability {
    Reachability::via(Route::Local)
}

/// Reachable iff the vault password can be obtained.
pub fn resolve_secrets(config: &StagehandConfig, signals: &Signals) -> Reachability {
    if signals.has_vault_password_env() {
        return Reachability::via(Route::Local);
    }
    let file = signals.vault_password_file(config);
    if file.is_file() {
        return Reachability::via(Route::Local);
    }
    Reachability::unreachable(
        NO_VAULT_PASSWORD,
        Some(format!(
            "export {} or write the password to {}",
            config.vault.password_env,
            file.display()
        )),
    )
}

/// Remote stage rules, evaluated for the provider named `owner`.
pub fn resolve_remote(
    stage: Stage,
    config: &StagehandConfig,
    signals: &Signals,
    owner: &str,
) -> Reachability {
    let environments: Vec<_> = config.environments_for(stage).collect();
    if environments.is_empty() {
        return Reachability::unreachable(
            NO_ENVIRONMENTS,
            Some(format!(
                "add an [[environments]] entry with stage = \"{}\" to stagehand.toml",
                stage
            )),
        );
    }

    if signals.is_on_target() {
        return Reachability::via(Route::Local);
    }

    let Some(environment) = environments.iter().find(|e| e.pipeline == owner) else {
        let env = environments[0];
        return Reachability::unreachable(
            OWNED_BY_OTHER,
            Some(format!(
                "environment '{}' uses pipeline '{}'",
                env.name, env.pipeline
            )),
        );
    };

    let key = signals.deploy_key(stage);
    if key.is_file() {
        return Reachability::via(Route::Ssh);
    }

    if signals.ci_token().is_some() && config.ci.is_some() {
        return Reachability::via(Route::Workflow);
    }

    let token_env = config
        .ci
        .as_ref()
        .map(|ci| ci.token_env.as_str())
        .unwrap_or("GITHUB_TOKEN");
    let keygen = keygen_command(&key, &deploy_key_comment(&config.project.name, stage));
    Reachability::unreachable(
        NO_KEY_NO_TOKEN,
        Some(format!(
            "run `{}` and authorize {}.pub on {}, or configure [ci] and export {}",
            keygen.display(),
            key.display(),
            environment.host,
            token_env
        )),
    )
}
