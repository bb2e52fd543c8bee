use serde::Serialize;

pub type DeployResult<T> = Result<T, DeployError>;

/// Invocation-level errors. Planning errors abort the whole run
/// before any remote call is made.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid target '{name}': {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("deployment plan has no targets")]
    EmptyPlan,

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("SSH connection failed: {0}")]
    SshFailed(String),

    #[error("remote command exited with {code:?}: {stderr}")]
    RemoteFailed { code: Option<i32>, stderr: String },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Per-target failures. These never abort the plan; they end up in
/// the target's [`ExecutionRecord`](crate::report::ExecutionRecord).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetError {
    #[error("materialize of '{target}' failed: {cause}")]
    MaterializeFailed { target: String, cause: String },

    #[error("could not record rollback point for '{target}': {cause}")]
    SnapshotUnavailable { target: String, cause: String },

    #[error("activation of '{target}' failed: {cause}")]
    ActivateFailed { target: String, cause: String },

    #[error("'{target}' did not stay running within {waited_secs}s")]
    HealthCheckTimeout { target: String, waited_secs: u64 },

    #[error("'{target}' is crash-looping (restarting on consecutive polls)")]
    CrashLoop { target: String },

    #[error(
        "'{target}' is unhealthy and has no previous known-good state \
         to roll back to"
    )]
    RollbackImpossible { target: String },

    #[error("rollback of '{target}' to {image} failed: {cause}")]
    RollbackFailed {
        target: String,
        image: String,
        cause: String,
    },
}

impl TargetError {
    /// Whether this failure may leave the host degraded and needs a
    /// human to look at it.
    #[must_use]
    pub const fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::RollbackImpossible { .. } | Self::RollbackFailed { .. }
        )
    }

    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::MaterializeFailed { target, .. }
            | Self::SnapshotUnavailable { target, .. }
            | Self::ActivateFailed { target, .. }
            | Self::HealthCheckTimeout { target, .. }
            | Self::CrashLoop { target }
            | Self::RollbackImpossible { target }
            | Self::RollbackFailed { target, .. } => target,
        }
    }
}
