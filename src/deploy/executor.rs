use tracing::info;

use crate::deploy::rollback::RollbackSnapshot;
use crate::engine::{ContainerEngine, ContainerState};
use crate::error::TargetError;
use crate::plan::Mode;
use crate::target::ServiceTarget;

/// Runs the mutating steps for one target against the engine.
///
/// [`Executor::activate`] takes the [`RollbackSnapshot`] produced by
/// [`Executor::snapshot`], so a target cannot be activated without a
/// recorded rollback point.
pub struct Executor<'a> {
    engine: &'a dyn ContainerEngine,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub const fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self { engine }
    }

    /// Build or pull the image. The running container is untouched.
    pub fn materialize(&self, target: &str, mode: Mode) -> Result<(), TargetError> {
        info!(service = target, %mode, "materializing image");
        self.engine
            .materialize(target, mode)
            .map_err(|e| TargetError::MaterializeFailed {
                target: target.to_string(),
                cause: e.to_string(),
            })
    }

    /// Read the target's current image and state before mutating it.
    ///
    /// When the target has no known-good reference yet, the image it
    /// was running at this point is taken as one. A target that was
    /// missing or not running keeps none.
    pub fn snapshot(&self, target: &mut ServiceTarget) -> Result<RollbackSnapshot, TargetError> {
        let status = self
            .engine
            .inspect(&target.name)
            .map_err(|e| TargetError::SnapshotUnavailable {
                target: target.name.clone(),
                cause: e.to_string(),
            })?;

        target.current_image_ref.clone_from(&status.image);

        if status.state == ContainerState::Running {
            target.seed_known_good(status.image.clone());
        }

        info!(
            service = %target.name,
            state = %status.state,
            image = ?status.image,
            known_good = ?target.last_known_good_ref(),
            "recorded rollback point"
        );

        Ok(RollbackSnapshot::new(target, status.state))
    }

    /// Stop the target's container and start it from the freshly
    /// materialized image. Only this target is touched.
    pub fn activate(&self, target: &str, snapshot: &RollbackSnapshot) -> Result<(), TargetError> {
        let failed = |e: crate::error::DeployError| TargetError::ActivateFailed {
            target: target.to_string(),
            cause: e.to_string(),
        };

        info!(
            service = target,
            previous = ?snapshot.previous_image,
            "activating new container"
        );
        self.engine.stop(target).map_err(failed)?;
        self.engine.start(target, None).map_err(failed)
    }
}
