//! Stagehand Core Library
//!
//! Staged remediation engine for multi-environment delivery: providers
//! contribute fixes per stage, the resolver decides how each stage is
//! reached (locally, over SSH or through a CI workflow) and the remediator
//! applies corrective actions in stage order.

pub mod bootstrap;
pub mod ci;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod fix;
pub mod provider;
pub mod reachability;
pub mod remediate;
pub mod report;
pub mod scan;
pub mod signals;
pub mod ssh;
pub mod types;
pub mod workspace;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{
        BootstrapConfig, CiConfig, ConfigStore, EnvironmentConfig, StagehandConfig,
    };

    // Engine
    pub use crate::commands::{RemediationEngine, StageRun, StageSelection};
    pub use crate::context::AppContext;
    pub use crate::fix::{Fix, FixContext, FixRegistry, ScanFinding};
    pub use crate::provider::{Provider, ProviderRegistry};
    pub use crate::reachability::{Reachability, Route};
    pub use crate::report::{FixOutcome, FixStatus, RemediationResult, ScanReport};
    pub use crate::signals::Signals;
    pub use crate::types::{ExecutionMode, Severity, Stage};
}
