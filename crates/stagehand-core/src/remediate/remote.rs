//! SSH route: bootstrap the stage host, then let it remediate itself.
//!
//! The delegated run is authoritative for the stage; its JSON report is
//! merged as-is.

use crate::bootstrap::RemoteBootstrap;
use crate::config::EnvironmentConfig;
use crate::error::RemediationError;
use crate::provider::ssh::PIPELINE;
use crate::report::{FixOutcome, FixStatus, RemediationResult, StageReport};
use crate::ssh::{SshSession, SshTarget, remote_path};
use crate::types::Stage;

use super::{Action, Remediator, stage_outcome};

impl Remediator<'_> {
    /// Every `ssh` environment of the stage is delegated to in turn, each
    /// over its own session. A failure on one host does not skip the rest.
    pub(super) fn run_ssh(
        &self,
        stage: Stage,
        action: Action,
        report: &mut StageReport,
    ) -> Vec<FixOutcome> {
        let environments: Vec<&EnvironmentConfig> = self
            .config
            .environments_for(stage)
            .filter(|e| e.pipeline == PIPELINE)
            .collect();
        if environments.is_empty() {
            return vec![stage_outcome(
                "ssh",
                stage,
                FixStatus::Failed,
                format!("no ssh environment configured for {}", stage),
            )];
        }

        let mut outcomes = Vec::new();
        for env in environments {
            outcomes.extend(
                self.delegate(stage, env, action, report)
                    .into_iter()
                    .map(|o| match o.environment {
                        Some(_) => o,
                        None => o.with_environment(env.name.clone()),
                    }),
            );
        }
        outcomes
    }

    fn delegate(
        &self,
        stage: Stage,
        env: &EnvironmentConfig,
        action: Action,
        report: &mut StageReport,
    ) -> Vec<FixOutcome> {
        let target = SshTarget::for_environment(env, self.signals.deploy_key(stage));
        let mut session = match SshSession::open(self.runner, target, &self.signals.control_dir()) {
            Ok(session) => session,
            Err(e) => {
                return vec![stage_outcome("ssh", stage, FixStatus::Failed, format!("{:#}", e))];
            }
        };

        let bootstrap = RemoteBootstrap::new(self.config, env, stage)
            .with_local_cli(self.local_cli.clone())
            .run(&session);
        let outcomes = match bootstrap {
            Ok(bootstrap) => {
                if bootstrap.changed() {
                    report
                        .notes
                        .push(format!("bootstrapped {}", session.target().host));
                }
                self.run_delegated(stage, env, action, &session, report)
            }
            Err(e) => {
                tracing::warn!(stage = %stage, host = %env.host, "{}", e);
                vec![stage_outcome("bootstrap", stage, FixStatus::Failed, e.to_string())]
            }
        };

        if let Err(e) = session.close() {
            tracing::debug!(host = %env.host, "closing ssh session: {:#}", e);
        }
        outcomes
    }

    fn run_delegated(
        &self,
        stage: Stage,
        env: &EnvironmentConfig,
        action: Action,
        session: &SshSession<'_>,
        report: &mut StageReport,
    ) -> Vec<FixOutcome> {
        let script = self.delegation_script(stage, action);
        tracing::info!(stage = %stage, host = %env.host, "delegating stage");
        let remote_failure = |message: String| {
            vec![stage_outcome(
                "remote",
                stage,
                FixStatus::Failed,
                RemediationError::RemoteReport {
                    host: env.host.clone(),
                    message,
                }
                .to_string(),
            )]
        };

        let output = match session.exec(&script) {
            Ok(output) => output,
            Err(e) => return remote_failure(format!("{:#}", e)),
        };
        match parse_remote_report(&output.stdout) {
            Ok(remote) => {
                report.notes.push(format!("delegated to {}", env.host));
                if let Some(summary) = remote.stage(stage) {
                    report.notes.extend(summary.notes.iter().cloned());
                }
                remote
                    .outcomes
                    .into_iter()
                    .filter(|o| o.stage == stage)
                    .collect()
            }
            Err(message) if output.success() => remote_failure(message),
            Err(message) => remote_failure(format!("{} ({})", message, output.summary())),
        }
    }

    /// Command the stage host runs against its own copy of the workspace.
    pub(crate) fn delegation_script(&self, stage: Stage, action: Action) -> String {
        let bootstrap = &self.config.bootstrap;
        let command = match action {
            Action::Fix => format!(
                "stagehand --workspace . fix {} --only-stage --on-target --format json",
                stage
            ),
            Action::Deploy => format!(
                "stagehand --workspace . deploy {} --on-target --yes --format json",
                stage
            ),
        };
        format!(
            "cd {} && export PATH={}:\"$PATH\" && {}",
            remote_path(&bootstrap.remote_dir),
            remote_path(&bootstrap.remote_bin_dir),
            command
        )
    }
}

/// Extract the JSON report from remote stdout, skipping any preamble.
///
/// The report starts on a line of its own, so candidates are the lines
/// opening with `{`, tried from the last one back.
pub(crate) fn parse_remote_report(stdout: &str) -> Result<RemediationResult, String> {
    let starts: Vec<usize> = std::iter::once(0)
        .chain(stdout.match_indices('\n').map(|(i, _)| i + 1))
        .filter(|&i| stdout[i..].starts_with('{'))
        .collect();

    let mut error = "no JSON report in output".to_string();
    for &start in starts.iter().rev() {
        match serde_json::from_str(stdout[start..].trim_end()) {
            Ok(report) => return Ok(report),
            Err(e) => error = format!("invalid report: {}", e),
        }
    }
    Err(error)
}
