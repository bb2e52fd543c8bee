//! Deployment planning: validate requested targets and freeze them
//! into a [`DeploymentPlan`].
//!
//! Planning is pure. Nothing here talks to the remote host, so a
//! rejected plan is guaranteed to have mutated nothing.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::error::{DeployError, DeployResult};

/// How a target's image is materialized on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// `docker compose build` on the remote host.
    Build,
    /// `docker compose pull` from the registry.
    PullOnly,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::PullOnly => f.write_str("pull"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanOptions {
    pub verify_health: bool,
    pub dry_run: bool,
    /// Roll an unhealthy target back to its known-good image. When
    /// off, the target is left activated and reported as failed.
    pub rollback: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            verify_health: false,
            dry_run: false,
            rollback: true,
        }
    }
}

/// An immutable, validated set of targets for one invocation.
/// Targets keep the caller's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    targets: Vec<String>,
    mode: Mode,
    options: PlanOptions,
}

impl DeploymentPlan {
    pub fn new<S: AsRef<str>>(
        targets: &[S],
        mode: Mode,
        options: PlanOptions,
    ) -> DeployResult<Self> {
        if targets.is_empty() {
            return Err(DeployError::EmptyPlan);
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(targets.len());

        for target in targets {
            let name = target.as_ref();
            validate_name(name)?;
            if !seen.insert(name) {
                return Err(invalid(name, "listed more than once"));
            }
            names.push(name.to_string());
        }

        Ok(Self {
            targets: names,
            mode,
            options,
        })
    }

    /// Reject targets that are not declared services of the compose
    /// project.
    pub fn check_declared(&self, declared: &[String]) -> DeployResult<()> {
        for name in &self.targets {
            if !declared.iter().any(|d| d == name) {
                return Err(invalid(name, "not a service in the compose file"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn options(&self) -> PlanOptions {
        self.options
    }

    #[must_use]
    pub const fn verify_health(&self) -> bool {
        self.options.verify_health
    }

    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.options.dry_run
    }
}

/// Compose service names are `[A-Za-z0-9._-]+`. Anything else is
/// rejected here, which also keeps names safe to splice into remote
/// shell commands.
fn validate_name(name: &str) -> DeployResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(invalid(name, &format!("character '{c}' is not allowed")));
    }
    if name.starts_with(['.', '-']) {
        return Err(invalid(name, "must start with a letter, digit or '_'"));
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> DeployError {
    DeployError::InvalidTarget {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
