use crate::error::{DeployError, DeployResult};

/// Result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    /// `None` when the remote process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Turn a non-zero exit into [`DeployError::RemoteFailed`],
    /// returning trimmed stdout otherwise.
    pub fn into_stdout(self) -> DeployResult<String> {
        if self.success() {
            Ok(self.stdout.trim().to_string())
        } else {
            Err(DeployError::RemoteFailed {
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// A channel that runs opaque shell commands on the deployment
/// host.
///
/// Implementations return `Err` only when the host could not be
/// reached (spawn failure, connection refused, timeout). A command
/// that ran and exited non-zero is an `Ok` with that exit code.
pub trait RemoteChannel {
    fn exec(&self, command: &str) -> DeployResult<ExecOutput>;

    /// Human-readable host descriptor for logs.
    fn describe(&self) -> String;
}
