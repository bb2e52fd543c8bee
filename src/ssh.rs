use std::time::Duration;

use crate::cmd;
use crate::error::{DeployError, DeployResult};
use crate::remote::{ExecOutput, RemoteChannel};

/// Exit status the OpenSSH client uses for its own failures
/// (connection refused, timeout, auth), as opposed to the remote
/// command's status.
const SSH_CLIENT_ERROR: i32 = 255;

/// SSH session wrapper for executing commands on a remote host.
#[derive(Debug, Clone)]
pub struct SshSession {
    host: String,
    user: String,
    key: Option<String>,
    connect_timeout: Duration,
}

impl SshSession {
    #[must_use]
    pub fn new(host: &str, user: &str) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            key: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key_path: &str) -> Self {
        self.key = Some(key_path.to_string());
        self
    }

    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Full argument vector passed to `ssh` for `command`.
    #[must_use]
    pub fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.ssh_base_args();
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    fn ssh_base_args(&self) -> Vec<String> {
        // ConnectTimeout only accepts whole seconds; never pass 0,
        // which ssh reads as "no timeout".
        let secs = self.connect_timeout.as_secs().max(1);
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={secs}"),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args
    }
}

impl RemoteChannel for SshSession {
    fn exec(&self, command: &str) -> DeployResult<ExecOutput> {
        let args = self.build_ssh_args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(command = %cmd::format_command("ssh", &refs), "remote exec");

        let output = cmd::capture("ssh", &refs)?;
        let exit_code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_code == Some(SSH_CLIENT_ERROR) {
            return Err(DeployError::SshFailed(format!(
                "{}: {}",
                self.destination(),
                stderr.trim()
            )));
        }

        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }

    fn describe(&self) -> String {
        self.destination()
    }
}
