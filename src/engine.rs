use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{DeployError, DeployResult};
use crate::plan::Mode;
use crate::target::ImageRef;

/// Coarse run-state of a target's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Running,
    Restarting,
    Exited,
    Missing,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Restarting => f.write_str("restarting"),
            Self::Exited => f.write_str("exited"),
            Self::Missing => f.write_str("missing"),
        }
    }
}

impl FromStr for ContainerState {
    type Err = DeployError;

    /// Accepts the values of Docker's `.State.Status`. States that
    /// are neither running nor restarting all count as exited.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "running" => Ok(Self::Running),
            "restarting" => Ok(Self::Restarting),
            "exited" | "created" | "paused" | "dead" | "removing" => Ok(Self::Exited),
            "missing" | "" => Ok(Self::Missing),
            other => Err(DeployError::Other(format!(
                "unknown container state: {other}"
            ))),
        }
    }
}

/// What the engine reports for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub state: ContainerState,
    /// Image bound to the container; `None` when it is missing.
    pub image: Option<ImageRef>,
}

impl ContainerStatus {
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            state: ContainerState::Missing,
            image: None,
        }
    }

    #[must_use]
    pub fn new(state: ContainerState, image: &str) -> Self {
        Self {
            state,
            image: Some(ImageRef::new(image)),
        }
    }
}

/// Container operations on the deployment host. Every operation is
/// scoped to exactly one named target and never cascades to other
/// services, even ones declared as dependencies.
pub trait ContainerEngine {
    /// Read-only query of the target's state and bound image.
    fn inspect(&self, target: &str) -> DeployResult<ContainerStatus>;

    /// Build or pull the target's image without touching the
    /// running container.
    fn materialize(&self, target: &str, mode: Mode) -> DeployResult<()>;

    fn stop(&self, target: &str) -> DeployResult<()>;

    /// Start the target. With `image`, the container is started from
    /// that exact image instead of whatever the project currently
    /// resolves the service to.
    fn start(&self, target: &str, image: Option<&ImageRef>) -> DeployResult<()>;
}
