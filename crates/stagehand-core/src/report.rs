//! Remediation outcomes and their aggregation.
//!
//! [`RemediationResult`] is also the wire format a delegated remote run
//! prints with `--format json`, so everything here round-trips through
//! serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reachability::Reachability;
use crate::types::{Severity, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixStatus {
    Fixed,
    Manual,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub id: String,
    pub stage: Stage,
    pub severity: Severity,
    pub status: FixStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Literal action an operator can take
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Environment the outcome was produced on, for multi-host stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl FixOutcome {
    pub fn new(id: impl Into<String>, stage: Stage, severity: Severity, status: FixStatus) -> Self {
        Self {
            id: id.into(),
            stage,
            severity,
            status,
            error: None,
            hint: None,
            environment: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

/// Per-stage context that is not derivable from outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub reachability: Reachability,
    pub upstream_gap: Option<String>,
    pub notes: Vec<String>,
}

impl StageReport {
    pub fn new(stage: Stage, reachability: Reachability) -> Self {
        Self {
            stage,
            reachability,
            upstream_gap: None,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub reachability: Reachability,
    pub fixed: usize,
    pub manual: usize,
    pub failed: usize,
    /// Unreachable while holding at least one critical fix
    pub critical_unreachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_gap: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub fixed: usize,
    pub manual: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub generated_at: DateTime<Utc>,
    pub outcomes: Vec<FixOutcome>,
    pub stages: Vec<StageSummary>,
    pub totals: Totals,
}

impl RemediationResult {
    /// Sum outcomes per stage, in stage order.
    pub fn aggregate(outcomes: Vec<FixOutcome>, mut stage_reports: Vec<StageReport>) -> Self {
        stage_reports.sort_by_key(|r| r.stage);

        let count = |stage: Stage, status: FixStatus| {
            outcomes
                .iter()
                .filter(|o| o.stage == stage && o.status == status)
                .count()
        };

        let stages = stage_reports
            .into_iter()
            .map(|report| {
                let holds_critical = outcomes
                    .iter()
                    .any(|o| o.stage == report.stage && o.severity.is_blocking());
                StageSummary {
                    stage: report.stage,
                    fixed: count(report.stage, FixStatus::Fixed),
                    manual: count(report.stage, FixStatus::Manual),
                    failed: count(report.stage, FixStatus::Failed),
                    critical_unreachable: !report.reachability.is_reachable() && holds_critical,
                    reachability: report.reachability,
                    upstream_gap: report.upstream_gap,
                    notes: report.notes,
                }
            })
            .collect::<Vec<_>>();

        let totals = Totals {
            fixed: stages.iter().map(|s| s.fixed).sum(),
            manual: stages.iter().map(|s| s.manual).sum(),
            failed: stages.iter().map(|s| s.failed).sum(),
        };

        Self {
            generated_at: Utc::now(),
            outcomes,
            stages,
            totals,
        }
    }

    /// False when anything failed or a stage holding a critical fix could
    /// not be reached.
    pub fn passed(&self) -> bool {
        self.totals.failed == 0 && !self.stages.iter().any(|s| s.critical_unreachable)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn outcomes_for(&self, stage: Stage) -> impl Iterator<Item = &FixOutcome> {
        self.outcomes.iter().filter(move |o| o.stage == stage)
    }

    /// A stage still has a failure or an unresolved critical fix.
    pub fn has_critical_gap(&self, stage: Stage) -> bool {
        self.outcomes_for(stage).any(|o| {
            o.status == FixStatus::Failed
                || (o.status == FixStatus::Manual && o.severity.is_blocking())
        })
    }
}

/// One problem as presented by `scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub id: String,
    pub severity: Severity,
    pub description: String,
    pub details: String,
    pub manual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageScan {
    pub stage: Stage,
    pub reachability: Reachability,
    pub problems: Vec<ScanEntry>,
    /// Checks that only run on the stage's host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub generated_at: DateTime<Utc>,
    pub stages: Vec<StageScan>,
}

impl ScanReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageScan> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn total(&self) -> usize {
        self.stages.iter().map(|s| s.problems.len()).sum()
    }

    pub fn has_critical(&self) -> bool {
        self.stages
            .iter()
            .flat_map(|s| &s.problems)
            .any(|p| p.severity.is_blocking())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::Route;

    fn outcome(id: &str, stage: Stage, severity: Severity, status: FixStatus) -> FixOutcome {
        FixOutcome::new(id, stage, severity, status)
    }

    #[test]
    fn test_aggregate_counts_per_stage() {
        let outcomes = vec![
            outcome("a", Stage::Dev, Severity::Critical, FixStatus::Fixed),
            outcome("b", Stage::Dev, Severity::Warning, FixStatus::Fixed),
            outcome("c", Stage::Dev, Severity::Warning, FixStatus::Failed),
            outcome("d", Stage::Secrets, Severity::Critical, FixStatus::Manual),
        ];
        let reports = vec![
            StageReport::new(Stage::Secrets, Reachability::via(Route::Local)),
            StageReport::new(Stage::Dev, Reachability::via(Route::Local)),
        ];

        let result = RemediationResult::aggregate(outcomes, reports);
        assert_eq!(result.stages[0].stage, Stage::Dev);
        assert_eq!(result.stages[0].fixed, 2);
        assert_eq!(result.stages[0].failed, 1);
        assert_eq!(
            result.totals,
            Totals {
                fixed: 2,
                manual: 1,
                failed: 1
            }
        );
        assert!(!result.passed());
        assert!(result.has_critical_gap(Stage::Secrets));
    }

    #[test]
    fn test_unreachable_critical_fails_run() {
        let outcomes = vec![outcome("k", Stage::Secrets, Severity::Critical, FixStatus::Manual)];
        let reports = vec![StageReport::new(
            Stage::Secrets,
            Reachability::unreachable("no vault password", None),
        )];
        let result = RemediationResult::aggregate(outcomes, reports);
        assert!(result.stages[0].critical_unreachable);
        assert!(!result.passed());
    }

    #[test]
    fn test_unreachable_without_critical_passes() {
        let outcomes = vec![outcome("w", Stage::Prod, Severity::Warning, FixStatus::Manual)];
        let reports = vec![StageReport::new(
            Stage::Prod,
            Reachability::unreachable("no SSH key and no CI token", None),
        )];
        let result = RemediationResult::aggregate(outcomes, reports);
        assert!(!result.stages[0].critical_unreachable);
        assert!(result.passed());
    }

    #[test]
    fn test_result_json_is_stable() {
        let result = RemediationResult::aggregate(
            vec![outcome("a", Stage::Staging, Severity::Warning, FixStatus::Fixed)],
            vec![StageReport::new(Stage::Staging, Reachability::via(Route::Local))],
        );
        let json = serde_json::to_string(&result).unwrap();
        let back: RemediationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
