//! TOML parser with helpful error messages

use super::schema::StagehandConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse stagehand.toml with detailed error messages
pub fn parse_stagehand_toml(path: &Path) -> Result<StagehandConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_stagehand_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse stagehand.toml content from string
pub fn parse_stagehand_toml_str(content: &str) -> Result<StagehandConfig> {
    let config: StagehandConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Enhance TOML parsing errors with helpful context
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.to_string();

    let line_hint = error_msg
        .lines()
        .find(|line| line.contains("line "))
        .and_then(|line| {
            line.split("line ")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<usize>().ok())
        });

    if let Some(line_num) = line_hint {
        let context = get_line_context(content, line_num);
        anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            context,
            error_msg
        )
    } else {
        anyhow::anyhow!("TOML parsing error: {}", error_msg)
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2).min(lines.len());
    let end = (line_num + 2).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &StagehandConfig) -> Result<String> {
    toml::to_string_pretty(config).with_context(|| "Failed to serialize configuration to TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
[project]
name = "shop"

[ci]
repository = "acme/shop"
workflow = "remediate.yml"

[[environments]]
name = "staging-eu"
stage = "staging"
host = "staging.example.com"
user = "deploy"

[[environments]]
name = "prod-eu"
stage = "prod"
host = "prod.example.com"
pipeline = "render"
"#;

        let config = parse_stagehand_toml_str(toml).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.environments[0].pipeline, "ssh");
        assert_eq!(config.environments[1].pipeline, "render");
        let ci = config.ci.unwrap();
        assert_eq!(ci.workflow, "remediate.yml");
        assert_eq!(ci.git_ref, "main");
        assert_eq!(ci.api_url.as_str(), "https://api.github.com/");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_stagehand_toml_str("").unwrap();
        assert!(config.project.name.is_empty());
        assert!(config.environments.is_empty());
        assert!(config.ci.is_none());
        assert_eq!(config.vault.password_env, "STAGEHAND_VAULT_PASSWORD");
    }

    #[test]
    fn test_parse_invalid_toml() {
        let toml = r#"
[project
name = "shop"
"#;

        assert!(parse_stagehand_toml_str(toml).is_err());
    }

    #[test]
    fn test_parse_unknown_stage_fails() {
        let toml = r#"
[[environments]]
name = "qa"
stage = "qa"
host = "qa.example.com"
"#;

        assert!(parse_stagehand_toml_str(toml).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_cli_requirement() {
        let toml = r#"
[bootstrap]
cli_version = "not a version"
"#;

        let err = format!("{:#}", parse_stagehand_toml_str(toml).unwrap_err());
        assert!(err.contains("cli_version"));
    }

    #[test]
    fn test_to_toml_roundtrip_keeps_execution_identity() {
        let mut original = StagehandConfig::for_project("shop");
        original
            .environments
            .push(crate::config::EnvironmentConfig::new(
                "staging-eu",
                Stage::Staging,
                "staging.example.com",
            ));
        original.execution = Some(crate::config::ExecutionConfig {
            stage: Stage::Staging,
            environment: "staging-eu".to_string(),
        });

        let toml_str = to_toml(&original).unwrap();
        let parsed = parse_stagehand_toml_str(&toml_str).unwrap();

        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[project]
name = "from-file"
"#
        )
        .unwrap();

        let config = parse_stagehand_toml(temp_file.path()).unwrap();
        assert_eq!(config.project.name, "from-file");
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let result = parse_stagehand_toml(Path::new("/nonexistent/path/stagehand.toml"));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_enhance_toml_error() {
        let toml = "invalid = [unclosed";
        let err = parse_stagehand_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("line ") || err.contains("TOML parsing error"));
    }
}
