//! Fix descriptors and the registry built from providers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::StagehandConfig;
use crate::exec::CommandRunner;
use crate::provider::ProviderRegistry;
use crate::signals::Signals;
use crate::types::{Severity, Stage};
use crate::workspace::Workspace;

/// Result of a scan predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ScanFinding {
    Clean,
    Problem { details: String },
}

impl ScanFinding {
    pub fn problem(details: impl Into<String>) -> Self {
        ScanFinding::Problem {
            details: details.into(),
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, ScanFinding::Problem { .. })
    }
}

/// Everything a fix may look at or act through.
pub struct FixContext<'a> {
    pub config: &'a StagehandConfig,
    pub workspace: &'a Workspace,
    pub signals: &'a Signals,
    pub runner: &'a dyn CommandRunner,
}

impl FixContext<'_> {
    /// Config as currently saved on disk. Fixes that edit the config read
    /// through this so that a re-scan observes their own correction.
    pub fn saved_config(&self) -> anyhow::Result<StagehandConfig> {
        self.workspace.config_store().load()
    }
}

/// A single check with an optional corrective action.
pub trait Fix: Send + Sync {
    /// Stable, registry-unique identifier
    fn id(&self) -> &str;

    fn stage(&self) -> Stage;

    fn severity(&self) -> Severity;

    fn description(&self) -> &str;

    /// Side-effect-free check.
    fn scan(&self, ctx: &FixContext<'_>) -> anyhow::Result<ScanFinding>;

    /// Apply the correction. `None` means the fix is manual-only;
    /// `Some(Ok(false))` means the action ran but did not succeed.
    fn correct(&self, _ctx: &FixContext<'_>) -> Option<anyhow::Result<bool>> {
        None
    }

    /// What an operator has to do when the fix cannot be applied.
    fn manual_instructions(&self, ctx: &FixContext<'_>) -> String;

    /// The check only means something on the stage's own host. Such fixes
    /// are skipped when scanning from an operator machine.
    fn on_target(&self) -> bool {
        false
    }
}

/// Immutable, ordered list of fixes.
pub struct FixRegistry {
    fixes: Vec<Box<dyn Fix>>,
}

impl FixRegistry {
    pub fn new(fixes: Vec<Box<dyn Fix>>) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        for fix in &fixes {
            if !seen.insert(fix.id().to_string()) {
                anyhow::bail!("Duplicate fix id: {}", fix.id());
            }
        }
        Ok(Self { fixes })
    }

    /// Collect fixes from every provider, in provider registration order.
    pub fn from_providers(
        providers: &ProviderRegistry,
        config: &StagehandConfig,
    ) -> anyhow::Result<Self> {
        let fixes = providers
            .all()
            .iter()
            .flat_map(|provider| provider.fixes(config))
            .collect();
        Self::new(fixes)
    }

    pub fn all(&self) -> &[Box<dyn Fix>] {
        &self.fixes
    }

    pub fn get(&self, id: &str) -> Option<&dyn Fix> {
        self.fixes
            .iter()
            .find(|f| f.id() == id)
            .map(|f| f.as_ref())
    }

    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &dyn Fix> {
        self.fixes
            .iter()
            .filter(move |f| f.stage() == stage)
            .map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}
