//! High-level commands for stagehand operations.
//!
//! This module is the public API the CLI drives: scan, fix and deploy a
//! stage. Each returns a [`StageRun`] carrying the report used for output
//! and exit-code derivation.

pub mod remediation;

pub use remediation::{RemediationEngine, StageRun, StageSelection};
