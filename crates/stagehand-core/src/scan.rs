//! Scanner: runs every scan predicate and buckets problems by stage.

use std::collections::BTreeMap;

use crate::error::RemediationError;
use crate::fix::{Fix, FixContext, FixRegistry, ScanFinding};
use crate::types::{Severity, Stage};

/// A fix whose scan reported a problem (or failed to run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub fix_id: String,
    pub stage: Stage,
    pub severity: Severity,
    pub description: String,
    pub details: String,
    /// Set when the scan itself errored
    pub fault: Option<RemediationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemSet {
    problems: BTreeMap<Stage, Vec<Problem>>,
    /// Fixes that can only be scanned on the stage's own host
    deferred: BTreeMap<Stage, Vec<String>>,
}

impl ProblemSet {
    pub fn problems(&self, stage: Stage) -> &[Problem] {
        self.problems.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn deferred(&self, stage: Stage) -> &[String] {
        self.deferred.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn push(&mut self, problem: Problem) {
        self.problems.entry(problem.stage).or_default().push(problem);
    }

    pub fn defer(&mut self, stage: Stage, fix_id: impl Into<String>) {
        self.deferred.entry(stage).or_default().push(fix_id.into());
    }

    pub fn total(&self) -> usize {
        self.problems.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Scan every registered fix, across all stages.
pub fn scan(fixes: &FixRegistry, ctx: &FixContext<'_>) -> ProblemSet {
    let mut set = ProblemSet::default();
    for fix in fixes.all() {
        let fix = fix.as_ref();
        if fix.on_target() && !ctx.signals.is_on_target() {
            set.defer(fix.stage(), fix.id());
            continue;
        }
        if let Some(problem) = scan_fix(fix, ctx) {
            set.push(problem);
        }
    }
    tracing::debug!(problems = set.total(), "scan complete");
    set
}

/// Scan a single fix. A scan error counts as a present problem.
pub fn scan_fix(fix: &dyn Fix, ctx: &FixContext<'_>) -> Option<Problem> {
    let problem = |details: String, fault: Option<RemediationError>| Problem {
        fix_id: fix.id().to_string(),
        stage: fix.stage(),
        severity: fix.severity(),
        description: fix.description().to_string(),
        details,
        fault,
    };

    match fix.scan(ctx) {
        Ok(ScanFinding::Clean) => None,
        Ok(ScanFinding::Problem { details }) => Some(problem(details, None)),
        Err(e) => {
            let fault = RemediationError::ScanFault {
                fix: fix.id().to_string(),
                message: format!("{:#}", e),
            };
            tracing::warn!(fix = fix.id(), "{}", fault);
            Some(problem(fault.to_string(), Some(fault)))
        }
    }
}
