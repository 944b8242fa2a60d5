//! External CI workflow capability.

pub mod github;

pub use github::{BlockingWorkflows, GitHubActionsClient};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::CiConfig;

/// A triggered workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Succeeded,
    /// Terminal, with the CI system's conclusion (`failure`, `cancelled`...)
    Failed { conclusion: String },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed { .. })
    }
}

pub trait WorkflowTrigger {
    fn trigger(
        &self,
        workflow: &str,
        inputs: &BTreeMap<String, String>,
    ) -> anyhow::Result<WorkflowRun>;

    fn poll_status(&self, run: &WorkflowRun) -> anyhow::Result<RunStatus>;
}

/// Fixed-interval polling bounded by a wall-clock timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn from_config(ci: &CiConfig) -> Self {
        Self {
            interval: ci.poll_interval(),
            timeout: ci.timeout(),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Finished(RunStatus),
    TimedOut { waited: Duration },
}

/// Poll `run` until it reaches a terminal state or the policy times out.
pub fn wait_for_completion(
    workflows: &dyn WorkflowTrigger,
    run: &WorkflowRun,
    policy: PollPolicy,
) -> anyhow::Result<WaitOutcome> {
    let started = Instant::now();
    loop {
        let status = workflows.poll_status(run)?;
        tracing::debug!(run_id = run.id, ?status, "polled workflow run");
        if status.is_terminal() {
            return Ok(WaitOutcome::Finished(status));
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Ok(WaitOutcome::TimedOut { waited });
        }
        std::thread::sleep(policy.interval.min(policy.timeout - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Scripted {
        statuses: RefCell<Vec<RunStatus>>,
    }

    impl WorkflowTrigger for Scripted {
        fn trigger(&self, _: &str, _: &BTreeMap<String, String>) -> anyhow::Result<WorkflowRun> {
            Ok(WorkflowRun {
                id: 1,
                url: "https://ci.example/runs/1".to_string(),
            })
        }

        fn poll_status(&self, _: &WorkflowRun) -> anyhow::Result<RunStatus> {
            let mut statuses = self.statuses.borrow_mut();
            if statuses.len() > 1 {
                Ok(statuses.remove(0))
            } else {
                Ok(statuses[0].clone())
            }
        }
    }

    fn run() -> WorkflowRun {
        WorkflowRun {
            id: 1,
            url: "https://ci.example/runs/1".to_string(),
        }
    }

    #[test]
    fn test_wait_returns_terminal_status() {
        let ci = Scripted {
            statuses: RefCell::new(vec![
                RunStatus::Queued,
                RunStatus::InProgress,
                RunStatus::Succeeded,
            ]),
        };
        let policy = PollPolicy {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(60),
        };
        assert_eq!(
            wait_for_completion(&ci, &run(), policy).unwrap(),
            WaitOutcome::Finished(RunStatus::Succeeded)
        );
    }

    #[test]
    fn test_wait_times_out() {
        let ci = Scripted {
            statuses: RefCell::new(vec![RunStatus::InProgress]),
        };
        let policy = PollPolicy {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        };
        assert!(matches!(
            wait_for_completion(&ci, &run(), policy).unwrap(),
            WaitOutcome::TimedOut { .. }
        ));
    }
}
