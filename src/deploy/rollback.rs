use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::{ContainerEngine, ContainerState};
use crate::error::TargetError;
use crate::target::{ImageRef, ServiceTarget};

/// State of a target captured before it is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackSnapshot {
    pub target: String,
    pub previous_state: ContainerState,
    pub previous_image: Option<ImageRef>,
    /// Rollback destination; `None` on a first deployment.
    pub known_good: Option<ImageRef>,
    pub taken_at: DateTime<Utc>,
}

impl RollbackSnapshot {
    #[must_use]
    pub fn new(target: &ServiceTarget, previous_state: ContainerState) -> Self {
        Self {
            target: target.name.clone(),
            previous_state,
            previous_image: target.current_image_ref.clone(),
            known_good: target.last_known_good_ref().cloned(),
            taken_at: Utc::now(),
        }
    }
}

/// Holds the rollback points of one deployment and restores targets
/// that fail verification.
pub struct RollbackController<'a> {
    engine: &'a dyn ContainerEngine,
    snapshots: HashMap<String, RollbackSnapshot>,
}

impl<'a> RollbackController<'a> {
    #[must_use]
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self {
            engine,
            snapshots: HashMap::new(),
        }
    }

    /// Keep `snapshot` and hand back a reference to it.
    pub fn record(&mut self, snapshot: RollbackSnapshot) -> &RollbackSnapshot {
        let key = snapshot.target.clone();
        self.snapshots.insert(key.clone(), snapshot);
        &self.snapshots[&key]
    }

    #[must_use]
    pub fn snapshot(&self, target: &str) -> Option<&RollbackSnapshot> {
        self.snapshots.get(target)
    }

    /// Replace the target's failed container with one running its
    /// known-good image.
    ///
    /// Without a known-good image nothing is touched and
    /// [`TargetError::RollbackImpossible`] is returned; the unhealthy
    /// container stays as activated.
    pub fn roll_back(&self, target: &str) -> Result<ImageRef, TargetError> {
        let Some(image) = self.snapshot(target).and_then(|s| s.known_good.clone()) else {
            warn!(service = target, "no known-good image, leaving container as is");
            return Err(TargetError::RollbackImpossible {
                target: target.to_string(),
            });
        };

        info!(service = target, %image, "rolling back");

        let failed = |e: crate::error::DeployError| {
            error!(
                service = target,
                %image,
                error = %e,
                "rollback failed, manual intervention required"
            );
            TargetError::RollbackFailed {
                target: target.to_string(),
                image: image.to_string(),
                cause: e.to_string(),
            }
        };

        self.engine.stop(target).map_err(failed)?;
        self.engine.start(target, Some(&image)).map_err(failed)?;

        info!(service = target, %image, "rolled back");
        Ok(image)
    }
}
