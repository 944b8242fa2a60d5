//! End-to-end engine runs with the default providers.

mod support;

use stagehand_core::commands::{RemediationEngine, StageSelection};
use stagehand_core::config::{CiConfig, StagehandConfig};
use stagehand_core::provider::ProviderRegistry;
use stagehand_core::reachability::{NO_ENVIRONMENTS, Reachability};
use stagehand_core::report::FixStatus;
use stagehand_core::types::{ExecutionMode, Stage};

use support::{FakeRunner, TestEnv, shop_config};

fn engine(env: &TestEnv, config: StagehandConfig, mode: ExecutionMode) -> RemediationEngine {
    RemediationEngine::with_parts(
        config,
        env.workspace(),
        env.signals(mode),
        ProviderRegistry::with_default_providers(),
        Box::new(FakeRunner::new()),
    )
    .unwrap()
}

#[test]
fn fix_dev_bootstraps_a_fresh_workspace_once() {
    let env = TestEnv::new();
    env.init_git();
    let engine = engine(&env, StagehandConfig::new(), ExecutionMode::Operator);

    let first = engine.fix_stage(Stage::Dev, StageSelection::WithPrerequisites);

    assert!(first.handled);
    assert!(first.result.passed());
    let fixed: Vec<_> = first
        .result
        .outcomes
        .iter()
        .filter(|o| o.status == FixStatus::Fixed)
        .map(|o| o.id.as_str())
        .collect();
    assert_eq!(fixed, vec!["base-config", "project-name", "state-dir-ignored"]);

    let saved = env.workspace().config_store().load().unwrap();
    assert!(!saved.project.name.is_empty());
    let gitignore = std::fs::read_to_string(env.root().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".stagehand/"));

    let second = engine.fix_stage(Stage::Dev, StageSelection::WithPrerequisites);
    assert!(second.result.outcomes.is_empty());
    assert!(second.result.passed());
}

#[test]
fn dev_without_git_leaves_manual_info() {
    let env = TestEnv::new();
    let engine = engine(&env, StagehandConfig::new(), ExecutionMode::Operator);

    let run = engine.fix_stage(Stage::Dev, StageSelection::OnlyStage);

    let git = run
        .result
        .outcomes
        .iter()
        .find(|o| o.id == "git-repository")
        .unwrap();
    assert_eq!(git.status, FixStatus::Manual);
    assert!(git.hint.as_deref().unwrap().contains("git init"));
    // info-level manual work does not fail the run
    assert!(run.result.passed());
}

#[test]
fn fix_staging_includes_secrets_in_operator_mode_only() {
    let env = TestEnv::new();
    env.save_config(&shop_config());

    let operator = engine(&env, shop_config(), ExecutionMode::Operator)
        .fix_stage(Stage::Staging, StageSelection::WithPrerequisites);
    let stages: Vec<_> = operator.result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![Stage::Secrets, Stage::Staging]);

    let only = engine(&env, shop_config(), ExecutionMode::Operator)
        .fix_stage(Stage::Staging, StageSelection::OnlyStage);
    let stages: Vec<_> = only.result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![Stage::Staging]);

    let on_target = engine(&env, shop_config(), ExecutionMode::OnTarget)
        .fix_stage(Stage::Staging, StageSelection::WithPrerequisites);
    let stages: Vec<_> = on_target.result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![Stage::Staging]);
}

#[test]
fn on_target_fix_creates_stage_env_file() {
    let env = TestEnv::new();
    env.save_config(&shop_config());
    let engine = engine(&env, shop_config(), ExecutionMode::OnTarget);

    let run = engine.fix_stage(Stage::Staging, StageSelection::OnlyStage);

    assert!(run.handled);
    let env_file = run
        .result
        .outcomes
        .iter()
        .find(|o| o.id == "stage-env-file-staging")
        .unwrap();
    assert_eq!(env_file.status, FixStatus::Fixed);
    assert!(env.root().join(".env.staging").is_file());

    // the fake runner answers the runtime check with success
    assert!(run
        .result
        .outcomes
        .iter()
        .all(|o| o.id != "container-runtime-staging"));
}

#[test]
fn missing_secrets_fail_a_staging_run() {
    let env = TestEnv::new();
    env.write_deploy_key(Stage::Staging);
    let engine = engine(&env, shop_config(), ExecutionMode::Operator);

    let run = engine.fix_stage(Stage::Prod, StageSelection::WithPrerequisites);

    assert!(!run.handled);
    assert!(!run.result.passed());
    let secrets = run.result.stage(Stage::Secrets).unwrap();
    assert!(secrets.critical_unreachable);
    let prod = run.result.stage(Stage::Prod).unwrap();
    assert!(prod.upstream_gap.as_deref().unwrap().contains("vault-password"));
}

#[test]
fn scan_reports_every_stage_with_reachability() {
    let env = TestEnv::new();
    let engine = engine(&env, StagehandConfig::new(), ExecutionMode::Operator);

    let run = engine.scan_stage(None);

    assert!(run.handled);
    let report = run.result;
    let stages: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let dev = report.stage(Stage::Dev).unwrap();
    assert!(dev.problems.iter().any(|p| p.id == "base-config"));
    let base = dev.problems.iter().find(|p| p.id == "base-config").unwrap();
    assert!(base.manual.contains("stagehand fix dev"));

    let secrets = report.stage(Stage::Secrets).unwrap();
    assert!(!secrets.reachability.is_reachable());
    assert!(secrets.problems.iter().any(|p| p.id == "vault-password"));

    match &report.stage(Stage::Prod).unwrap().reachability {
        Reachability::Unreachable { reason, .. } => assert_eq!(reason, NO_ENVIRONMENTS),
        other => panic!("expected unreachable, got {other:?}"),
    }
    assert!(report.has_critical());
}

#[test]
fn scan_lists_on_target_checks_as_deferred() {
    let env = TestEnv::new();
    env.write_deploy_key(Stage::Staging);
    let engine = engine(&env, shop_config(), ExecutionMode::Operator);

    let report = engine.scan_stage(Some(Stage::Staging)).result;

    assert_eq!(report.stages.len(), 1);
    let staging = &report.stages[0];
    assert_eq!(
        staging.deferred,
        vec!["container-runtime-staging", "stage-env-file-staging"]
    );
    assert!(staging.problems.is_empty());
}

#[test]
fn ci_workflow_fix_only_with_ci_section() {
    let env = TestEnv::new();
    let plain = engine(&env, shop_config(), ExecutionMode::Operator);
    assert!(plain.fixes().get("ci-workflow").is_none());

    let mut config = shop_config();
    config.ci = Some(CiConfig::new("acme/shop"));
    let with_ci = engine(&env, config, ExecutionMode::Operator);
    assert!(with_ci.fixes().get("ci-workflow").is_some());

    let report = with_ci.scan_stage(Some(Stage::Dev)).result;
    let dev = report.stage(Stage::Dev).unwrap();
    let workflow = dev.problems.iter().find(|p| p.id == "ci-workflow").unwrap();
    assert!(workflow.details.contains("stagehand.yml"));
}
