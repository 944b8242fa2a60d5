//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use crate::config::ConfigStore;
use crate::types::ExecutionMode;
use crate::workspace::Workspace;

/// Paths and flags a frontend resolves once and hands to the engine.
#[derive(Debug, Clone)]
pub struct AppContext {
    home_dir: PathBuf,
    workspace_root: PathBuf,
    config_path: Option<PathBuf>,
    mode: ExecutionMode,
    local_cli: Option<PathBuf>,
}

impl AppContext {
    /// Create a new context with explicit paths.
    pub fn new(home_dir: PathBuf, workspace_root: PathBuf, mode: ExecutionMode) -> Self {
        Self {
            home_dir,
            workspace_root,
            config_path: None,
            mode,
            local_cli: None,
        }
    }

    /// Create a context with system defaults. Without an explicit workspace
    /// the enclosing git work tree of the current directory is used.
    pub fn with_defaults(workspace: Option<PathBuf>, mode: ExecutionMode) -> anyhow::Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        let workspace_root = match workspace {
            Some(root) => root.canonicalize().unwrap_or(root),
            None => {
                let cwd = std::env::current_dir()?;
                Workspace::discover(&cwd).root().to_path_buf()
            }
        };

        let mut ctx = Self::new(home_dir, workspace_root, mode);
        ctx.local_cli = std::env::current_exe().ok();
        Ok(ctx)
    }

    /// Use a config file other than `<workspace>/stagehand.toml`.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn with_local_cli(mut self, path: Option<PathBuf>) -> Self {
        self.local_cli = path;
        self
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn local_cli(&self) -> Option<&Path> {
        self.local_cli.as_deref()
    }

    pub fn workspace(&self) -> Workspace {
        let workspace = Workspace::at(self.workspace_root.clone());
        match &self.config_path {
            Some(path) => workspace.with_config_path(path.clone()),
            None => workspace,
        }
    }

    pub fn config_store(&self) -> ConfigStore {
        self.workspace().config_store()
    }
}
