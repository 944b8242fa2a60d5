//! Shared core types used across configuration, providers and the remediator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment stages, in the fixed order they are remediated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Operator workstation and base project configuration.
    Dev,
    /// Vault access and artifacts derived from it (deploy keys).
    Secrets,
    /// Pre-production hosts.
    Staging,
    /// Production hosts.
    Prod,
}

impl Stage {
    /// All stages in remediation order.
    pub const ALL: [Stage; 4] = [Stage::Dev, Stage::Secrets, Stage::Staging, Stage::Prod];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Secrets => "secrets",
            Stage::Staging => "staging",
            Stage::Prod => "prod",
        }
    }

    /// Stages backed by configured hosts rather than the operator machine.
    pub fn is_remote(self) -> bool {
        matches!(self, Stage::Staging | Stage::Prod)
    }

    /// Stages that must be resolved earlier in the same run.
    ///
    /// Remote stages depend on the deploy keys produced while resolving
    /// `secrets`.
    pub fn prerequisites(self) -> &'static [Stage] {
        match self {
            Stage::Staging | Stage::Prod => &[Stage::Secrets],
            Stage::Dev | Stage::Secrets => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Stage::Dev),
            "secrets" => Ok(Stage::Secrets),
            "staging" | "stage" => Ok(Stage::Staging),
            "prod" | "production" => Ok(Stage::Prod),
            other => anyhow::bail!(
                "Unknown stage: {}. Use 'dev', 'secrets', 'staging' or 'prod'",
                other
            ),
        }
    }
}

/// How much a detected problem matters for promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks promotion of the stage.
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn is_blocking(self) -> bool {
        self == Severity::Critical
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// Where the current process runs relative to the stage it works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Operator machine; remote stages are reached over SSH or CI.
    #[default]
    Operator,
    /// Already on the target host; remote stages run locally.
    OnTarget,
}

impl ExecutionMode {
    pub fn is_on_target(self) -> bool {
        self == ExecutionMode::OnTarget
    }
}
