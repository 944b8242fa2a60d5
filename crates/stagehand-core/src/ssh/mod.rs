//! SSH/SCP invocation helpers.
//!
//! Every remote stage gets exactly one multiplexed control connection. The
//! master is opened once (`ssh -M -N -f`) and every later command or upload
//! rides on its control socket, so a stage costs a single authentication.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::EnvironmentConfig;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::types::Stage;

const KEEPALIVE_OPTIONS: [&str; 7] = [
    "BatchMode=yes",
    "ServerAliveInterval=30",
    "ServerAliveCountMax=6",
    "StrictHostKeyChecking=accept-new",
    "IdentitiesOnly=yes",
    "ConnectTimeout=15",
    "LogLevel=ERROR",
];

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity: PathBuf,
}

impl SshTarget {
    pub fn for_environment(env: &EnvironmentConfig, identity: PathBuf) -> Self {
        Self {
            host: env.host.clone(),
            user: env.user.clone(),
            port: env.port,
            identity,
        }
    }

    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Quote a string for a POSIX shell.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Render a remote path for a shell command, keeping `~` expandable.
pub fn remote_path(path: &str) -> String {
    if path == "~" {
        return "\"$HOME\"".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("\"$HOME\"/{}", sh_quote(rest)),
        None => sh_quote(path),
    }
}

/// Render a remote path for scp. Relative paths are resolved against the
/// remote home directory.
pub fn scp_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => rest.to_string(),
        None if path == "~" => ".".to_string(),
        None => path.to_string(),
    }
}

/// Join a directory and a file name in remote-path notation.
pub fn remote_join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Comment embedded in a stage deploy key, `stagehand-<project>-<stage>`.
pub fn deploy_key_comment(project: &str, stage: Stage) -> String {
    let project = if project.is_empty() { "project" } else { project };
    format!("stagehand-{}-{}", project, stage)
}

/// `ssh-keygen` invocation provisioning a stage deploy key.
pub fn keygen_command(path: &Path, comment: &str) -> CommandSpec {
    CommandSpec::new("ssh-keygen")
        .args(["-t", "ed25519", "-N", "", "-C", comment, "-f"])
        .arg(path.display().to_string())
}

/// An open control connection to one host.
pub struct SshSession<'a> {
    runner: &'a dyn CommandRunner,
    target: SshTarget,
    control_path: String,
    open: bool,
}

impl<'a> SshSession<'a> {
    /// Start the control master. Fails when the host cannot be reached or
    /// refuses the identity.
    pub fn open(
        runner: &'a dyn CommandRunner,
        target: SshTarget,
        control_dir: &Path,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(control_dir).with_context(|| {
            format!(
                "Failed to create control socket directory: {}",
                control_dir.display()
            )
        })?;

        let mut session = Self {
            runner,
            control_path: control_dir.join("%C").display().to_string(),
            target,
            open: false,
        };

        let spec = CommandSpec::new("ssh")
            .args(["-M", "-N", "-f"])
            .args(session.common_args(false))
            .arg("-o")
            .arg("ControlPersist=no")
            .arg(session.target.destination())
            .detached();

        tracing::info!(host = %session.target.host, "opening ssh session");
        let output = runner
            .run(&spec)
            .with_context(|| format!("Failed to start ssh to {}", session.target.host))?;
        if !output.success() {
            anyhow::bail!(
                "ssh to {} failed ({}); check that {} is authorized on the host",
                session.target.destination(),
                output.summary(),
                session.target.identity.display()
            );
        }

        session.open = true;
        Ok(session)
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Run a shell script on the remote host.
    pub fn exec(&self, script: &str) -> anyhow::Result<CommandOutput> {
        self.run_remote(script, None)
    }

    /// Run a shell script with `input` on its stdin.
    pub fn exec_with_stdin(&self, script: &str, input: &str) -> anyhow::Result<CommandOutput> {
        self.run_remote(script, Some(input))
    }

    fn run_remote(&self, script: &str, input: Option<&str>) -> anyhow::Result<CommandOutput> {
        let mut spec = CommandSpec::new("ssh")
            .args(self.client_args(false))
            .arg(self.target.destination())
            .arg(script);
        if let Some(input) = input {
            spec = spec.stdin(input);
        }
        tracing::debug!(host = %self.target.host, script, "remote exec");
        self.runner
            .run(&spec)
            .with_context(|| format!("Failed to run ssh to {}", self.target.host))
    }

    /// Copy a local file to `remote` (a `~/`-relative or absolute path).
    pub fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<CommandOutput> {
        let spec = CommandSpec::new("scp")
            .args(self.client_args(true))
            .arg(local.display().to_string())
            .arg(format!("{}:{}", self.target.destination(), scp_path(remote)));
        tracing::debug!(host = %self.target.host, local = %local.display(), remote, "upload");
        self.runner
            .run(&spec)
            .with_context(|| format!("Failed to run scp to {}", self.target.host))
    }

    /// Stop the control master.
    pub fn close(&mut self) -> anyhow::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let spec = CommandSpec::new("ssh")
            .args(["-O", "exit"])
            .args(self.client_args(false))
            .arg(self.target.destination());
        let output = self.runner.run(&spec)?;
        if !output.success() {
            tracing::debug!(host = %self.target.host, error = %output.summary(), "ssh master exit");
        }
        Ok(())
    }

    /// Arguments for commands riding on the master; never become one.
    fn client_args(&self, scp_style: bool) -> Vec<String> {
        let mut args = self.common_args(scp_style);
        args.push("-o".to_string());
        args.push("ControlMaster=no".to_string());
        args
    }

    fn common_args(&self, scp_style: bool) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.target.port {
            args.push(if scp_style { "-P" } else { "-p" }.to_string());
            args.push(port.to_string());
        }
        args.push("-i".to_string());
        args.push(self.target.identity.display().to_string());
        args.push("-o".to_string());
        args.push(format!("ControlPath={}", self.control_path));
        for option in KEEPALIVE_OPTIONS {
            args.push("-o".to_string());
            args.push(option.to_string());
        }
        args
    }
}

impl Drop for SshSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(host = %self.target.host, "failed to close ssh session: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl CommandRunner for Recorder {
        fn run(&self, spec: &CommandSpec) -> anyhow::Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok(CommandOutput::success_with(""))
        }
    }

    fn target() -> SshTarget {
        SshTarget {
            host: "staging.example.com".to_string(),
            user: Some("deploy".to_string()),
            port: Some(2222),
            identity: PathBuf::from("/home/op/.ssh/staging_deploy_key"),
        }
    }

    #[test]
    fn test_sh_quote_escapes_single_quotes() {
        assert_eq!(sh_quote("plain"), "'plain'");
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_remote_path_keeps_home_expandable() {
        assert_eq!(remote_path("~/stagehand"), "\"$HOME\"/'stagehand'");
        assert_eq!(remote_path("~"), "\"$HOME\"");
        assert_eq!(remote_path("/srv/app"), "'/srv/app'");
        assert_eq!(scp_path("~/.local/bin/stagehand"), ".local/bin/stagehand");
        assert_eq!(scp_path("/opt/bin/stagehand"), "/opt/bin/stagehand");
    }

    #[test]
    fn test_keygen_command() {
        let spec = keygen_command(Path::new("/home/op/.ssh/prod_deploy_key"), "stagehand-shop-prod");
        assert_eq!(spec.program, "ssh-keygen");
        assert_eq!(
            spec.args,
            vec![
                "-t",
                "ed25519",
                "-N",
                "",
                "-C",
                "stagehand-shop-prod",
                "-f",
                "/home/op/.ssh/prod_deploy_key"
            ]
        );
    }

    #[test]
    fn test_session_reuses_one_master() {
        let temp = tempfile::TempDir::new().unwrap();
        let runner = Recorder::default();
        {
            let session = SshSession::open(&runner, target(), temp.path()).unwrap();
            session.exec("true").unwrap();
            session
                .upload(Path::new("/usr/bin/stagehand"), "~/.local/bin/stagehand")
                .unwrap();
        }

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);

        let masters = calls.iter().filter(|c| c.args.iter().any(|a| a == "-M")).count();
        assert_eq!(masters, 1);
        assert!(calls[0].detached);

        let control = format!("ControlPath={}", temp.path().join("%C").display());
        assert!(calls.iter().all(|c| c.args.contains(&control)));

        assert_eq!(calls[1].args.last().unwrap(), "true");
        assert!(calls[1].args.contains(&"-p".to_string()));
        assert_eq!(calls[2].program, "scp");
        assert!(calls[2].args.contains(&"-P".to_string()));
        assert_eq!(
            calls[2].args.last().unwrap(),
            "deploy@staging.example.com:.local/bin/stagehand"
        );
        assert!(calls[3].args.windows(2).any(|w| w == ["-O", "exit"]));

        let client = "ControlMaster=no".to_string();
        assert!(!calls[0].args.contains(&client));
        assert!(calls[1..].iter().all(|c| c.args.contains(&client)));
    }
}
