//! Environment signals gathered once per process.
//!
//! Reachability depends on a handful of ambient facts (vault password
//! variable, CI token, home directory, execution mode). They are captured
//! here up front and passed explicitly so that resolution stays a pure
//! function of config plus signals. File existence (keys, password files)
//! is checked live because corrective actions create those files mid-run.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{StagehandConfig, paths};
use crate::config::schema::default_token_env;
use crate::types::{ExecutionMode, Stage};

#[derive(Clone)]
pub struct Signals {
    mode: ExecutionMode,
    home_dir: PathBuf,
    vault_password_env: bool,
    ci_token: Option<String>,
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signals")
            .field("mode", &self.mode)
            .field("home_dir", &self.home_dir)
            .field("vault_password_env", &self.vault_password_env)
            .field("ci_token", &self.ci_token.as_ref().map(|_| "****"))
            .finish()
    }
}

impl Signals {
    /// Signals with nothing set, rooted at the given home directory.
    pub fn new(mode: ExecutionMode, home_dir: PathBuf) -> Self {
        Self {
            mode,
            home_dir,
            vault_password_env: false,
            ci_token: None,
        }
    }

    /// Read the process environment once.
    pub fn capture(
        config: &StagehandConfig,
        mode: ExecutionMode,
        home_dir: PathBuf,
    ) -> Self {
        let vault_password_env = non_empty_var(&config.vault.password_env).is_some();
        let token_env = config
            .ci
            .as_ref()
            .map(|ci| ci.token_env.clone())
            .unwrap_or_else(default_token_env);
        let ci_token = non_empty_var(&token_env);

        tracing::debug!(
            mode = ?mode,
            vault_password_env,
            ci_token = ci_token.is_some(),
            "captured environment signals"
        );

        Self {
            mode,
            home_dir,
            vault_password_env,
            ci_token,
        }
    }

    pub fn with_vault_password_env(mut self, present: bool) -> Self {
        self.vault_password_env = present;
        self
    }

    pub fn with_ci_token(mut self, token: Option<String>) -> Self {
        self.ci_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_on_target(&self) -> bool {
        self.mode.is_on_target()
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn has_vault_password_env(&self) -> bool {
        self.vault_password_env
    }

    pub fn ci_token(&self) -> Option<&str> {
        self.ci_token.as_deref()
    }

    /// Configured vault password file, or the per-user default.
    pub fn vault_password_file(&self, config: &StagehandConfig) -> PathBuf {
        match &config.vault.password_file {
            Some(path) => paths::expand_home(path, &self.home_dir),
            None => paths::default_vault_password_file(&self.home_dir),
        }
    }

    pub fn deploy_key(&self, stage: Stage) -> PathBuf {
        paths::deploy_key_path(&self.home_dir, stage)
    }

    pub fn control_dir(&self) -> PathBuf {
        paths::control_socket_dir(&self.home_dir)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let signals = Signals::new(ExecutionMode::Operator, PathBuf::from("/home/op"))
            .with_ci_token(Some("ghp_secret".to_string()));
        let debug = format!("{:?}", signals);
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_empty_token_is_absent() {
        let signals = Signals::new(ExecutionMode::Operator, PathBuf::from("/home/op"))
            .with_ci_token(Some(String::new()));
        assert!(signals.ci_token().is_none());
    }

    #[test]
    fn test_vault_password_file_defaults_under_home() {
        let signals = Signals::new(ExecutionMode::Operator, PathBuf::from("/home/op"));
        let config = StagehandConfig::new();
        assert_eq!(
            signals.vault_password_file(&config),
            PathBuf::from("/home/op/.stagehand/vault_password")
        );
    }

    #[test]
    fn test_vault_password_file_expands_configured_path() {
        let signals = Signals::new(ExecutionMode::Operator, PathBuf::from("/home/op"));
        let mut config = StagehandConfig::new();
        config.vault.password_file = Some("~/secrets/pw".to_string());
        assert_eq!(
            signals.vault_password_file(&config),
            PathBuf::from("/home/op/secrets/pw")
        );
    }
}
