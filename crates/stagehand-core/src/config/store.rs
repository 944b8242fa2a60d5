//! Config store for loading and saving stagehand.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{StagehandConfig, parser, paths};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn for_workspace(workspace_root: &Path) -> Self {
        Self::from_path(paths::config_path(workspace_root))
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.is_file()
    }

    /// Load the config, falling back to defaults when the file is missing.
    pub fn load(&self) -> anyhow::Result<StagehandConfig> {
        if !self.exists() {
            return Ok(StagehandConfig::new());
        }
        parser::parse_stagehand_toml(&self.config_path)
    }

    pub fn save(&self, config: &StagehandConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
