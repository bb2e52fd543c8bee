//! Deployable targets and their per-invocation state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// Reference to a container image, as reported by the engine
/// (an image ID or a `name:tag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    #[must_use]
    pub fn new(reference: &str) -> Self {
        Self(reference.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A named compose service and the image references known for it
/// during one invocation.
///
/// `last_known_good_ref` can only move forward through
/// [`ServiceTarget::mark_verified`], which the orchestrator calls
/// after a successful health verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTarget {
    pub name: String,
    pub current_image_ref: Option<ImageRef>,
    last_known_good_ref: Option<ImageRef>,
}

impl ServiceTarget {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            current_image_ref: None,
            last_known_good_ref: None,
        }
    }

    /// Seed the known-good reference from an earlier verified state
    /// (ledger entry or the image that was running at snapshot).
    #[must_use]
    pub fn with_known_good(mut self, image: Option<ImageRef>) -> Self {
        self.last_known_good_ref = image;
        self
    }

    /// Fill in the known-good reference if none is recorded yet.
    pub fn seed_known_good(&mut self, image: Option<ImageRef>) {
        if self.last_known_good_ref.is_none() {
            self.last_known_good_ref = image;
        }
    }

    #[must_use]
    pub const fn last_known_good_ref(&self) -> Option<&ImageRef> {
        self.last_known_good_ref.as_ref()
    }

    /// Record `image` as verified healthy.
    pub fn mark_verified(&mut self, image: ImageRef) {
        self.current_image_ref = Some(image.clone());
        self.last_known_good_ref = Some(image);
    }
}

/// Lifecycle of one target within a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Deploying,
    Activated,
    Healthy,
    Unhealthy,
    Done,
    RolledBack,
    Failed,
}

impl TargetState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::RolledBack | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEvent {
    /// Old container stopped, new one started.
    Activated,
    /// Verification skipped for this plan.
    Unverified,
    Stable,
    Unstable,
    /// Known-good reference committed.
    Committed,
    RolledBack,
    Failed,
}

/// Transition table for [`TargetState`].
#[derive(Debug, Clone)]
pub struct TargetMachine {
    state: TargetState,
}

impl TargetMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: TargetState::Deploying,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TargetState {
        self.state
    }

    pub fn process(&mut self, event: TargetEvent) -> DeployResult<TargetState> {
        use TargetEvent as E;
        use TargetState as S;

        let next = match (self.state, event) {
            (S::Deploying, E::Activated) => S::Activated,
            (S::Activated, E::Unverified) | (S::Healthy, E::Committed) => S::Done,
            (S::Activated, E::Stable) => S::Healthy,
            (S::Activated, E::Unstable) => S::Unhealthy,
            (S::Unhealthy, E::RolledBack) => S::RolledBack,
            (S::Deploying | S::Unhealthy, E::Failed) => S::Failed,
            (state, event) => {
                return Err(DeployError::Other(format!(
                    "invalid target transition: {state:?} -> {event:?}"
                )));
            }
        };

        self.state = next;
        Ok(next)
    }
}

impl Default for TargetMachine {
    fn default() -> Self {
        Self::new()
    }
}
