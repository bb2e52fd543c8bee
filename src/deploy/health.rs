//! Post-activation liveness polling.
//!
//! A target is healthy only once it has reported `running` on two
//! polls at least one interval apart with nothing else in between.
//! A single `running` right after start is not enough: a
//! crash-looping container shows `running` briefly between restarts.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::engine::{ContainerEngine, ContainerState};
use crate::error::TargetError;
use crate::target::ImageRef;

/// Consecutive `restarting` observations that count as a crash loop.
const CRASH_LOOP_RESTARTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Stable `running`; carries the image the container runs.
    Healthy(Option<ImageRef>),
    Unhealthy(TargetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verdict: Verdict,
    pub polls: u32,
    /// Time from the first poll to the verdict.
    pub elapsed: Duration,
}

pub struct HealthVerifier<'a> {
    engine: &'a dyn ContainerEngine,
    clock: &'a dyn Clock,
    policy: HealthPolicy,
}

impl<'a> HealthVerifier<'a> {
    #[must_use]
    pub const fn new(
        engine: &'a dyn ContainerEngine,
        clock: &'a dyn Clock,
        policy: HealthPolicy,
    ) -> Self {
        Self {
            engine,
            clock,
            policy,
        }
    }

    pub fn verify(&self, target: &str) -> Verification {
        let HealthPolicy { interval, timeout } = self.policy;
        let start = self.clock.now();
        let mut running_since: Option<Duration> = None;
        let mut restarts = 0;
        let mut polls = 0;

        loop {
            polls += 1;
            let result = self.engine.inspect(target);
            // Taken after the poll: a slow or retried query counts
            // against the timeout.
            let elapsed = self.clock.now().saturating_sub(start);

            match result {
                Ok(status) => {
                    debug!(service = target, state = %status.state, ?elapsed, "health poll");
                    match status.state {
                        ContainerState::Running => {
                            restarts = 0;
                            let since = *running_since.get_or_insert(elapsed);
                            if elapsed.saturating_sub(since) >= interval {
                                info!(service = target, polls, "container is stable");
                                return Verification {
                                    verdict: Verdict::Healthy(status.image),
                                    polls,
                                    elapsed,
                                };
                            }
                        }
                        ContainerState::Restarting => {
                            running_since = None;
                            restarts += 1;
                            if restarts >= CRASH_LOOP_RESTARTS {
                                warn!(service = target, polls, "container is crash-looping");
                                return Verification {
                                    verdict: Verdict::Unhealthy(TargetError::CrashLoop {
                                        target: target.to_string(),
                                    }),
                                    polls,
                                    elapsed,
                                };
                            }
                        }
                        ContainerState::Exited | ContainerState::Missing => {
                            running_since = None;
                            restarts = 0;
                        }
                    }
                }
                Err(e) => {
                    // Cannot confirm it stayed up across this poll.
                    warn!(service = target, error = %e, "health poll failed");
                    running_since = None;
                }
            }

            if elapsed + interval > timeout {
                warn!(service = target, polls, ?timeout, "health check timed out");
                return Verification {
                    verdict: Verdict::Unhealthy(TargetError::HealthCheckTimeout {
                        target: target.to_string(),
                        waited_secs: elapsed.as_secs(),
                    }),
                    polls,
                    elapsed,
                };
            }

            self.clock.sleep(interval);
        }
    }
}
