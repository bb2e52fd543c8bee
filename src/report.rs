use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TargetError;
use crate::plan::Mode;
use crate::target::ImageRef;

/// Terminal result for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    HealthCheckFailed,
    ExecutionFailed,
    RolledBack,
    /// Not attempted: dry run, or the run was interrupted first.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::HealthCheckFailed => "health-check-failed",
            Self::ExecutionFailed => "execution-failed",
            Self::RolledBack => "rolled-back",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Materialize,
    Snapshot,
    Activate,
    Verify,
    Rollback,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Materialize => "materialize",
            Self::Snapshot => "snapshot",
            Self::Activate => "activate",
            Self::Verify => "verify",
            Self::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Failed,
    /// Dry run: would have executed.
    Planned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TargetError>,
    /// Image the target ended up running, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    pub steps: Vec<StepRecord>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn begin(target: &str) -> Self {
        let now = Utc::now();
        Self {
            target: target.to_string(),
            started_at: now,
            finished_at: now,
            outcome: Outcome::Skipped,
            error: None,
            image: None,
            steps: Vec::new(),
        }
    }

    /// Record for a target that was never started.
    #[must_use]
    pub fn skipped(target: &str) -> Self {
        Self::begin(target)
    }

    pub fn step(&mut self, step: Step, status: StepStatus, detail: Option<String>) {
        self.steps.push(StepRecord {
            step,
            status,
            detail,
        });
    }

    #[must_use]
    pub fn finish(mut self, outcome: Outcome, error: Option<TargetError>) -> Self {
        self.finished_at = Utc::now();
        self.outcome = outcome;
        self.error = error;
        self
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    #[must_use]
    pub fn requires_operator(&self) -> bool {
        self.error.as_ref().is_some_and(TargetError::requires_operator)
    }
}

/// Aggregate result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    pub mode: Mode,
    pub dry_run: bool,
    pub records: Vec<ExecutionRecord>,
}

impl DeploymentReport {
    #[must_use]
    pub const fn new(mode: Mode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn record(&self, target: &str) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.target == target)
    }

    /// Every target succeeded, or was skipped as part of a dry run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.records.iter().all(|r| self.is_ok(r))
    }

    #[must_use]
    pub fn failed_targets(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| !self.is_ok(r))
            .map(|r| r.target.as_str())
            .collect()
    }

    /// Targets that may have been left degraded.
    #[must_use]
    pub fn operator_targets(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.requires_operator())
            .map(|r| r.target.as_str())
            .collect()
    }

    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.is_success())
    }

    fn is_ok(&self, record: &ExecutionRecord) -> bool {
        match record.outcome {
            Outcome::Success => true,
            Outcome::Skipped => self.dry_run,
            Outcome::HealthCheckFailed | Outcome::ExecutionFailed | Outcome::RolledBack => false,
        }
    }

    /// Human-readable summary, one block per target.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        if self.dry_run {
            let _ = writeln!(out, "=== Dry run: no changes were made ===");
        }

        let width = self
            .records
            .iter()
            .map(|r| r.target.len())
            .max()
            .unwrap_or(0);

        for record in &self.records {
            let _ = write!(out, "{:width$}  {}", record.target, record.outcome);
            if let Some(image) = &record.image {
                let _ = write!(out, "  ({image})");
            }
            out.push('\n');

            if self.dry_run {
                for step in &record.steps {
                    let _ = write!(out, "{:width$}    would {}", "", step.step);
                    if let Some(detail) = &step.detail {
                        let _ = write!(out, ": {detail}");
                    }
                    out.push('\n');
                }
            }

            if let Some(detail) = record.error_detail() {
                let _ = writeln!(out, "{:width$}    cause: {detail}", "");
            }
        }

        let failed = self.failed_targets();
        if !failed.is_empty() {
            let _ = writeln!(out, "\nFailed: {}", failed.join(", "));
        }

        let operator = self.operator_targets();
        if !operator.is_empty() {
            let _ = writeln!(
                out,
                "MANUAL INTERVENTION REQUIRED: {}",
                operator.join(", ")
            );
        }

        out
    }
}
