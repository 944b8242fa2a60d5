//! Stagehand - staged remediation for multi-environment delivery
//!
//! Usage:
//!   stagehand scan [STAGE]              # Show problems and reachability
//!   stagehand fix <STAGE>               # Remediate a stage (and secrets first)
//!   stagehand deploy <STAGE>            # Remediate, then deploy
//!
//! Exit codes: 0 pass, 1 remediation failed or critical gap, 2 usage or
//! configuration error.

mod interactive;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagehand_core::commands::{RemediationEngine, StageSelection};
use stagehand_core::context::AppContext;
use stagehand_core::reachability::Reachability;
use stagehand_core::report::{FixStatus, RemediationResult, ScanReport};
use stagehand_core::types::{ExecutionMode, Severity, Stage};

use crate::interactive::DeployPrompt;

const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Parser)]
#[command(name = "stagehand", version)]
#[command(about = "Staged remediation for multi-environment delivery", long_about = None)]
struct Cli {
    /// Path to stagehand.toml (defaults to <workspace>/stagehand.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory (defaults to the enclosing git work tree)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan all stages (or one) and show problems with per-stage reachability
    Scan {
        #[arg(value_parser = parse_stage)]
        stage: Option<Stage>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remediate a stage
    ///
    /// In operator mode, staging and prod run the secrets stage first.
    Fix {
        #[arg(value_parser = parse_stage)]
        stage: Stage,

        /// Run exactly the named stage, without prerequisites
        #[arg(long)]
        only_stage: bool,

        /// This machine is the stage's host
        #[arg(long)]
        on_target: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remediate, then deploy the stage when no critical gap remains
    Deploy {
        #[arg(value_parser = parse_stage)]
        stage: Stage,

        /// This machine is the stage's host
        #[arg(long)]
        on_target: bool,

        /// Skip the production confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only a summary line
    Quiet,
}

fn parse_stage(s: &str) -> std::result::Result<Stage, String> {
    s.parse::<Stage>().map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "stagehand=debug,info"
    } else {
        "stagehand=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run_cli(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            std::process::exit(EXIT_USAGE);
        }
    }
}

fn run_cli(cli: Cli) -> Result<i32> {
    let mode = |on_target: bool| {
        if on_target {
            ExecutionMode::OnTarget
        } else {
            ExecutionMode::Operator
        }
    };

    match cli.command {
        Commands::Scan { stage, format } => {
            let engine = build_engine(&cli.workspace, &cli.config, ExecutionMode::Operator)?;
            let run = engine.scan_stage(stage);
            print_scan(&run.result, format)?;
            Ok(if run.result.has_critical() { EXIT_FAILED } else { 0 })
        }
        Commands::Fix {
            stage,
            only_stage,
            on_target,
            format,
        } => {
            let engine = build_engine(&cli.workspace, &cli.config, mode(on_target))?;
            let selection = if only_stage {
                StageSelection::OnlyStage
            } else {
                StageSelection::WithPrerequisites
            };
            let run = engine.fix_stage(stage, selection);
            print_result(&run.result, format)?;
            Ok(if run.result.passed() { 0 } else { EXIT_FAILED })
        }
        Commands::Deploy {
            stage,
            on_target,
            yes,
            format,
        } => {
            if !stage.is_remote() {
                anyhow::bail!("only staging and prod can be deployed, got '{}'", stage);
            }
            let engine = build_engine(&cli.workspace, &cli.config, mode(on_target))?;

            if stage == Stage::Prod && !yes {
                let environments: Vec<String> = engine
                    .config()
                    .environments_for(stage)
                    .map(|e| e.name.clone())
                    .collect();
                if !DeployPrompt::new().confirm(stage, &environments)? {
                    eprintln!("Deploy cancelled.");
                    return Ok(EXIT_FAILED);
                }
            }

            let run = engine.deploy_stage(stage);
            print_result(&run.result, format)?;
            let ok = run.result.passed() && !run.result.has_critical_gap(stage);
            Ok(if ok { 0 } else { EXIT_FAILED })
        }
    }
}

fn build_engine(
    workspace: &Option<PathBuf>,
    config: &Option<PathBuf>,
    mode: ExecutionMode,
) -> Result<RemediationEngine> {
    let ctx = AppContext::with_defaults(workspace.clone(), mode)?.with_config_path(config.clone());
    RemediationEngine::from_context(&ctx)
}

// =============================================================================
// Output
// =============================================================================

fn print_scan(report: &ScanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Quiet => {
            if report.total() > 0 {
                println!("{} problems found", report.total());
            }
        }
        OutputFormat::Table => {
            for stage in &report.stages {
                println!(
                    "{} {}",
                    style(format!("{:<8}", stage.stage.as_str())).bold(),
                    reachability_label(&stage.reachability)
                );
                if let Reachability::Unreachable {
                    hint: Some(hint), ..
                } = &stage.reachability
                {
                    println!("         {} {}", style("hint:").dim(), hint);
                }
                if stage.problems.is_empty() && stage.deferred.is_empty() {
                    println!("  {}", style("no problems").green());
                }
                for problem in &stage.problems {
                    println!(
                        "  {} {:<28} {}",
                        severity_label(problem.severity),
                        problem.id,
                        problem.details
                    );
                    println!("    {} {}", style("->").dim(), problem.manual);
                }
                for id in &stage.deferred {
                    println!("  {} {:<28} checked on the stage host", style("[deferred]").dim(), id);
                }
                println!();
            }
            if report.total() == 0 {
                println!("Summary: no problems");
            } else {
                println!(
                    "Summary: {} problems (run 'stagehand fix <stage>' to resolve)",
                    report.total()
                );
            }
        }
    }
    Ok(())
}

fn print_result(result: &RemediationResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result)?,
        OutputFormat::Quiet => {
            if !result.passed() {
                println!(
                    "{} failed, {} manual",
                    result.totals.failed, result.totals.manual
                );
            }
        }
        OutputFormat::Table => {
            for summary in &result.stages {
                println!(
                    "{} {}  fixed {}  manual {}  failed {}",
                    style(format!("{:<8}", summary.stage.as_str())).bold(),
                    reachability_label(&summary.reachability),
                    summary.fixed,
                    summary.manual,
                    summary.failed
                );
                if let Some(gap) = &summary.upstream_gap {
                    println!("  {} {}", style("upstream:").yellow(), gap);
                }
                for note in &summary.notes {
                    println!("  {} {}", style("note:").dim(), note);
                }
                for outcome in result.outcomes_for(summary.stage) {
                    let id = match &outcome.environment {
                        Some(env) => format!("{}@{}", outcome.id, env),
                        None => outcome.id.clone(),
                    };
                    println!(
                        "  {} {:<28} {}",
                        status_label(outcome.status),
                        id,
                        outcome.error.as_deref().unwrap_or("")
                    );
                    if let Some(hint) = &outcome.hint
                        && outcome.status != FixStatus::Fixed
                    {
                        println!("    {} {}", style("->").dim(), hint);
                    }
                }
                println!();
            }

            let verdict = if result.passed() {
                style("passed").green().bold()
            } else {
                style("failed").red().bold()
            };
            println!(
                "Summary: {} fixed, {} manual, {} failed - {}",
                result.totals.fixed, result.totals.manual, result.totals.failed, verdict
            );
        }
    }
    Ok(())
}

/// Versioned JSON: the report's own fields plus `schema_version`.
fn print_json<T: serde::Serialize>(report: &T) -> Result<()> {
    let mut output = serde_json::to_value(report)?;
    if let Some(map) = output.as_object_mut() {
        map.insert("schema_version".to_string(), serde_json::json!(1));
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn reachability_label(reachability: &Reachability) -> String {
    match reachability {
        Reachability::Reachable { via } => style(format!("reachable via {}", via)).green().to_string(),
        Reachability::Unreachable { reason, .. } => {
            style(format!("unreachable: {}", reason)).red().to_string()
        }
    }
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Critical => style("[critical]").red().to_string(),
        Severity::Warning => style("[warning] ").yellow().to_string(),
        Severity::Info => style("[info]    ").cyan().to_string(),
    }
}

fn status_label(status: FixStatus) -> String {
    match status {
        FixStatus::Fixed => style("[fixed] ").green().to_string(),
        FixStatus::Manual => style("[manual]").yellow().to_string(),
        FixStatus::Failed => style("[failed]").red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fix_with_flags() {
        let cli = Cli::try_parse_from([
            "stagehand",
            "--workspace",
            ".",
            "fix",
            "staging",
            "--only-stage",
            "--on-target",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.workspace, Some(PathBuf::from(".")));
        match cli.command {
            Commands::Fix {
                stage,
                only_stage,
                on_target,
                format,
            } => {
                assert_eq!(stage, Stage::Staging);
                assert!(only_stage);
                assert!(on_target);
                assert!(matches!(format, OutputFormat::Json));
            }
            _ => panic!("expected fix"),
        }
    }

    #[test]
    fn parse_scan_without_stage() {
        let cli = Cli::try_parse_from(["stagehand", "scan"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { stage: None, .. }));
    }

    #[test]
    fn parse_rejects_unknown_stage() {
        assert!(Cli::try_parse_from(["stagehand", "fix", "qa"]).is_err());
    }

    #[test]
    fn parse_deploy_yes() {
        let cli = Cli::try_parse_from(["stagehand", "deploy", "prod", "-y"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Deploy {
                stage: Stage::Prod,
                yes: true,
                ..
            }
        ));
    }
}
