use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::health::HealthPolicy;
use crate::error::{DeployError, DeployResult};
use crate::ssh::SshSession;

/// Resolved settings for one invocation. Built by the CLI from flags
/// and environment; the library itself never reads the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub user: String,
    pub remote_dir: String,
    pub ssh_key: Option<String>,
    pub connect_timeout: Duration,
    pub health: HealthPolicy,
    pub query_retries: u32,
    /// Local JSON file persisting known-good images.
    pub state_file: Option<PathBuf>,
    /// Local copy of the compose file to validate target names.
    pub compose_file: Option<PathBuf>,
}

impl Settings {
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            user: "root".to_string(),
            remote_dir: "/opt/app".to_string(),
            ssh_key: None,
            connect_timeout: Duration::from_secs(30),
            health: HealthPolicy::default(),
            query_retries: 2,
            state_file: None,
            compose_file: None,
        }
    }

    pub fn validate(&self) -> DeployResult<()> {
        if self.host.trim().is_empty() {
            return Err(DeployError::Other("remote host is empty".into()));
        }
        if self.remote_dir.trim().is_empty() {
            return Err(DeployError::Other("remote directory is empty".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(DeployError::Other("connect timeout must be positive".into()));
        }
        if self.health.interval.is_zero() {
            return Err(DeployError::Other(
                "health-check interval must be positive".into(),
            ));
        }
        if self.health.timeout < self.health.interval {
            return Err(DeployError::Other(format!(
                "health-check timeout ({}s) is shorter than the interval ({}s)",
                self.health.timeout.as_secs(),
                self.health.interval.as_secs()
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn ssh_session(&self) -> SshSession {
        let session =
            SshSession::new(&self.host, &self.user).connect_timeout(self.connect_timeout);
        match &self.ssh_key {
            Some(key) => session.with_key(key),
            None => session,
        }
    }
}
