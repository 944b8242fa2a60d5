//! Providers contribute fixes and, for the stages they own, reachability.
//!
//! Ownership of `dev` and `secrets` is fixed; ownership of a remote stage
//! follows the `pipeline` tag of its environments.

pub mod base;
pub mod github;
pub mod registry;
pub mod ssh;
pub mod vault;

pub use registry::ProviderRegistry;

use crate::config::StagehandConfig;
use crate::fix::Fix;
use crate::reachability::{NO_OWNER, Reachability};
use crate::signals::Signals;
use crate::types::Stage;

pub trait Provider: Send + Sync {
    /// Provider name; remote environments select their owner by this name
    /// through their `pipeline` tag.
    fn name(&self) -> &'static str;

    /// Stages whose reachability this provider can resolve.
    fn owned_stages(&self) -> &'static [Stage] {
        &[]
    }

    fn owns(&self, stage: Stage) -> bool {
        self.owned_stages().contains(&stage)
    }

    /// Fixes for the given config, in registration order.
    fn fixes(&self, config: &StagehandConfig) -> Vec<Box<dyn Fix>>;

    fn resolve(&self, stage: Stage, _config: &StagehandConfig, _signals: &Signals) -> Reachability {
        Reachability::unreachable(
            NO_OWNER,
            Some(format!("provider '{}' does not resolve {}", self.name(), stage)),
        )
    }
}
