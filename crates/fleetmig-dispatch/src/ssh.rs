//! `ssh`/`scp` transport

use crate::error::TransportError;
use crate::result::RunOutput;
use crate::transport::Transport;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Exit status `ssh` uses for its own failures
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Quote `s` as one word for a POSIX shell
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Runs scripts with `ssh` and copies files with `scp`, using one identity
#[derive(Debug, Clone)]
pub struct SshTransport {
    identity_file: PathBuf,
    ssh_program: String,
    scp_program: String,
}

impl SshTransport {
    /// Transport authenticating with `identity_file`
    #[must_use]
    pub fn new(identity_file: impl Into<PathBuf>) -> Self {
        Self {
            identity_file: identity_file.into(),
            ssh_program: "ssh".into(),
            scp_program: "scp".into(),
        }
    }

    /// Use other `ssh` and `scp` executables
    #[must_use]
    pub fn with_programs(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "-i".into(),
            self.identity_file.display().to_string(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
        ]
    }

    /// Arguments for running `script` on `user_host`
    #[must_use]
    pub fn ssh_args(&self, user_host: &str, script: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push(user_host.to_string());
        args.push(format!("sudo -n bash -c {}", shell_quote(script)));
        args
    }

    /// Arguments for copying `local` to `user_host:remote_path`
    #[must_use]
    pub fn scp_args(&self, local: &Path, user_host: &str, remote_path: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push(local.display().to_string());
        args.push(format!("{user_host}:{remote_path}"));
        args
    }

    async fn launch(&self, program: &str, args: &[String]) -> Result<Output, TransportError> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| TransportError::Launch {
                program: program.to_string(),
                reason: err.to_string(),
            })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn copy_file(
        &self,
        local: &Path,
        user_host: &str,
        remote_path: &str,
    ) -> Result<(), TransportError> {
        let args = self.scp_args(local, user_host, remote_path);
        debug!(program = %self.scp_program, ?args, "copying");
        let output = self.launch(&self.scp_program, &args).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(TransportError::Copy {
            local: local.to_path_buf(),
            destination: format!("{user_host}:{remote_path}"),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn run_script(&self, user_host: &str, script: &str) -> Result<RunOutput, TransportError> {
        debug!(host = user_host, "running script:\n{script}");
        let output = self
            .launch(&self.ssh_program, &self.ssh_args(user_host, script))
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(SSH_CONNECTION_FAILURE) => {
                Err(TransportError::unreachable(user_host, stderr.trim()))
            }
            Some(code) => Ok(RunOutput {
                code,
                stdout,
                stderr,
            }),
            None => Err(TransportError::unreachable(user_host, "ssh terminated by signal")),
        }
    }
}
