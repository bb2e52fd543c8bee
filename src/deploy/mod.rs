//! Drives a [`DeploymentPlan`] through materialize, snapshot,
//! activate, verify and, when needed, rollback.
//!
//! Targets run strictly one after another in plan order. A failure
//! is confined to its own target: it never skips later targets and
//! never rolls back anyone else.

pub mod executor;
pub mod health;
pub mod rollback;

use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::engine::ContainerEngine;
use crate::error::{DeployResult, TargetError};
use crate::ledger::KnownGoodLedger;
use crate::plan::{DeploymentPlan, Mode};
use crate::report::{DeploymentReport, ExecutionRecord, Outcome, Step, StepStatus};
use crate::target::{ImageRef, ServiceTarget, TargetEvent, TargetMachine};

use executor::Executor;
use health::{HealthPolicy, HealthVerifier, Verdict};
use rollback::RollbackController;

pub struct Orchestrator<'a> {
    engine: &'a dyn ContainerEngine,
    clock: &'a dyn Clock,
    health: HealthPolicy,
    ledger: KnownGoodLedger,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(engine: &'a dyn ContainerEngine, clock: &'a dyn Clock) -> Self {
        Self {
            engine,
            clock,
            health: HealthPolicy::default(),
            ledger: KnownGoodLedger::in_memory(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub const fn health_policy(mut self, policy: HealthPolicy) -> Self {
        self.health = policy;
        self
    }

    #[must_use]
    pub fn ledger(mut self, ledger: KnownGoodLedger) -> Self {
        self.ledger = ledger;
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub const fn known_good(&self) -> &KnownGoodLedger {
        &self.ledger
    }

    /// Execute `plan` and report one record per target, in plan
    /// order.
    ///
    /// Per-target failures are part of the report. `Err` is only
    /// returned for internal inconsistencies.
    pub fn run(&mut self, plan: &DeploymentPlan) -> DeployResult<DeploymentReport> {
        let mut report = DeploymentReport::new(plan.mode(), plan.dry_run());
        let mut rollback = RollbackController::new(self.engine);

        for name in plan.targets() {
            if self.cancel.is_cancelled() {
                warn!(service = %name, "interrupted, skipping");
                report.records.push(ExecutionRecord::skipped(name));
                continue;
            }

            let record = if plan.dry_run() {
                self.describe(plan, name)
            } else {
                self.deploy_target(plan, name, &mut rollback)?
            };

            log_outcome(&record);
            report.records.push(record);
        }

        Ok(report)
    }

    /// Dry run: list the steps without touching the engine.
    fn describe(&self, plan: &DeploymentPlan, name: &str) -> ExecutionRecord {
        let mut record = ExecutionRecord::begin(name);
        let materialize = match plan.mode() {
            Mode::Build => format!("build image for {name}"),
            Mode::PullOnly => format!("pull image for {name}"),
        };

        record.step(Step::Materialize, StepStatus::Planned, Some(materialize));
        record.step(
            Step::Snapshot,
            StepStatus::Planned,
            Some("record the currently running image".to_string()),
        );
        record.step(
            Step::Activate,
            StepStatus::Planned,
            Some(format!("stop and recreate {name} without its dependencies")),
        );
        if plan.verify_health() {
            let on_failure = if plan.options().rollback {
                "roll back on failure"
            } else {
                "leave in place on failure"
            };
            record.step(
                Step::Verify,
                StepStatus::Planned,
                Some(format!(
                    "poll every {}s for up to {}s, {on_failure}",
                    self.health.interval.as_secs(),
                    self.health.timeout.as_secs()
                )),
            );
        }

        record.finish(Outcome::Skipped, None)
    }

    /// Image of the freshly started container, for the report only.
    fn started_image(&self, name: &str) -> Option<ImageRef> {
        match self.engine.inspect(name) {
            Ok(status) => status.image,
            Err(e) => {
                warn!(service = name, error = %e, "could not read the started image");
                None
            }
        }
    }

    fn deploy_target(
        &mut self,
        plan: &DeploymentPlan,
        name: &str,
        rollback: &mut RollbackController<'a>,
    ) -> DeployResult<ExecutionRecord> {
        let executor = Executor::new(self.engine);
        let mut record = ExecutionRecord::begin(name);
        let mut machine = TargetMachine::new();
        let mut target = ServiceTarget::new(name).with_known_good(self.ledger.get(name).cloned());

        info!(service = name, "deploying");

        if let Err(e) = executor.materialize(name, plan.mode()) {
            return fail(record, &mut machine, Step::Materialize, e);
        }
        record.step(Step::Materialize, StepStatus::Done, None);

        let snapshot = match executor.snapshot(&mut target) {
            Ok(snapshot) => rollback.record(snapshot),
            Err(e) => return fail(record, &mut machine, Step::Snapshot, e),
        };
        record.step(
            Step::Snapshot,
            StepStatus::Done,
            Some(match &snapshot.previous_image {
                Some(image) => format!("{} ({image})", snapshot.previous_state),
                None => snapshot.previous_state.to_string(),
            }),
        );

        if let Err(e) = executor.activate(name, snapshot) {
            return fail(record, &mut machine, Step::Activate, e);
        }
        record.step(Step::Activate, StepStatus::Done, None);
        machine.process(TargetEvent::Activated)?;

        if !plan.verify_health() {
            machine.process(TargetEvent::Unverified)?;
            record.image = self.started_image(name);
            return Ok(record.finish(Outcome::Success, None));
        }

        let verifier = HealthVerifier::new(self.engine, self.clock, self.health);
        let verification = verifier.verify(name);

        match verification.verdict {
            Verdict::Healthy(image) => {
                machine.process(TargetEvent::Stable)?;
                record.step(
                    Step::Verify,
                    StepStatus::Done,
                    Some(format!("stable after {} polls", verification.polls)),
                );

                if let Some(image) = image {
                    target.mark_verified(image.clone());
                    if let Err(e) = self.ledger.record(name, image) {
                        warn!(service = name, error = %e, "could not persist known-good image");
                    }
                }
                machine.process(TargetEvent::Committed)?;

                record.image = target.current_image_ref.clone();
                Ok(record.finish(Outcome::Success, None))
            }
            Verdict::Unhealthy(cause) => {
                machine.process(TargetEvent::Unstable)?;
                record.step(Step::Verify, StepStatus::Failed, Some(cause.to_string()));
                recover(plan, name, rollback, record, &mut machine, cause)
            }
        }
    }
}

/// Handle a target that failed verification: roll it back, or leave
/// it as is when rollback is disabled or impossible.
fn recover(
    plan: &DeploymentPlan,
    name: &str,
    rollback: &RollbackController<'_>,
    mut record: ExecutionRecord,
    machine: &mut TargetMachine,
    cause: TargetError,
) -> DeployResult<ExecutionRecord> {
    if !plan.options().rollback {
        machine.process(TargetEvent::Failed)?;
        return Ok(record.finish(Outcome::HealthCheckFailed, Some(cause)));
    }

    match rollback.roll_back(name) {
        Ok(image) => {
            record.step(Step::Rollback, StepStatus::Done, Some(image.to_string()));
            machine.process(TargetEvent::RolledBack)?;
            record.image = Some(image);
            Ok(record.finish(Outcome::RolledBack, Some(cause)))
        }
        Err(e @ TargetError::RollbackImpossible { .. }) => {
            record.step(Step::Rollback, StepStatus::Failed, Some(e.to_string()));
            machine.process(TargetEvent::Failed)?;
            Ok(record.finish(Outcome::ExecutionFailed, Some(e)))
        }
        Err(e) => {
            record.step(Step::Rollback, StepStatus::Failed, Some(e.to_string()));
            machine.process(TargetEvent::RolledBack)?;
            Ok(record.finish(Outcome::RolledBack, Some(e)))
        }
    }
}

fn fail(
    mut record: ExecutionRecord,
    machine: &mut TargetMachine,
    step: Step,
    error: TargetError,
) -> DeployResult<ExecutionRecord> {
    record.step(step, StepStatus::Failed, Some(error.to_string()));
    machine.process(TargetEvent::Failed)?;
    Ok(record.finish(Outcome::ExecutionFailed, Some(error)))
}

fn log_outcome(record: &ExecutionRecord) {
    match record.outcome {
        Outcome::Success | Outcome::Skipped => {
            info!(service = %record.target, outcome = %record.outcome, "target finished");
        }
        _ if record.requires_operator() => {
            error!(
                service = %record.target,
                outcome = %record.outcome,
                cause = ?record.error_detail(),
                "target needs manual intervention"
            );
        }
        _ => {
            warn!(
                service = %record.target,
                outcome = %record.outcome,
                cause = ?record.error_detail(),
                "target failed"
            );
        }
    }
}
