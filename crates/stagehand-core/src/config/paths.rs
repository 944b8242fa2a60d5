//! Config and signal path resolution helpers.

use std::path::{Path, PathBuf};

use crate::types::Stage;

pub const CONFIG_FILE_NAME: &str = "stagehand.toml";

/// Per-workspace and per-user state directory name.
pub const STATE_DIR_NAME: &str = ".stagehand";

pub fn config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(CONFIG_FILE_NAME)
}

/// Expand a leading `~/` against the given home directory.
pub fn expand_home(path: &str, home_dir: &Path) -> PathBuf {
    if path == "~" {
        return home_dir.to_path_buf();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home_dir.join(rest),
        None => PathBuf::from(path),
    }
}

pub fn default_vault_password_file(home_dir: &Path) -> PathBuf {
    home_dir.join(STATE_DIR_NAME).join("vault_password")
}

/// Stage-specific deploy key. Generic identities never stand in for it.
pub fn deploy_key_path(home_dir: &Path, stage: Stage) -> PathBuf {
    home_dir.join(".ssh").join(format!("{}_deploy_key", stage))
}

/// Directory holding SSH control sockets.
pub fn control_socket_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(STATE_DIR_NAME).join("cm")
}
