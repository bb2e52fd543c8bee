//! Selective deployment of Docker Compose services on a single VPS.
//!
//! Capataz redeploys a chosen subset of the services of a compose
//! project running on a remote host, one at a time, over SSH. For
//! each service it builds or pulls the image, records what was
//! running, recreates the container without touching its
//! dependencies, waits for it to stay up, and rolls it back to the
//! last known-good image if it does not.
//!
//! The name is Portuguese for *foreman*: it oversees each service
//! through the change and puts it back if the new one fails.
//!
//! # Architecture
//!
//! A run goes through three parts:
//!
//! 1. **Plan** - [`DeploymentPlan`] validates the requested service
//!    names and freezes their order. No remote call is made.
//! 2. **Execute** - the [`Executor`](deploy::executor::Executor)
//!    materializes the image, snapshots the current container, then
//!    activates the new one.
//! 3. **Verify** - the [`HealthVerifier`](deploy::health::HealthVerifier)
//!    polls the container until it is stable or the timeout expires;
//!    the [`RollbackController`](deploy::rollback::RollbackController)
//!    restores the known-good image on failure.
//!
//! [`Orchestrator`] ties these together and returns a
//! [`DeploymentReport`]. Container operations go through the
//! [`ContainerEngine`] trait; the production implementation is
//! [`ComposeEngine`] over an [`SshSession`].
//!
//! # Example
//!
//! ```rust,no_run
//! use capataz::{
//!     ComposeEngine, DeploymentPlan, Mode, Orchestrator, PlanOptions,
//!     SshSession, SystemClock,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let plan = DeploymentPlan::new(
//!         &["api", "web"],
//!         Mode::PullOnly,
//!         PlanOptions {
//!             verify_health: true,
//!             ..PlanOptions::default()
//!         },
//!     )?;
//!
//!     let engine = ComposeEngine::new(
//!         SshSession::new("vps.example.com", "deploy"),
//!         "/opt/app",
//!     );
//!     let clock = SystemClock::new();
//!
//!     let report = Orchestrator::new(&engine, &clock).run(&plan)?;
//!     print!("{}", report.render_text());
//!
//!     std::process::exit(i32::from(report.exit_code()));
//! }
//! ```
//!
//! From the command line:
//!
//! ```sh
//! export DEPLOY_HOST=vps.example.com DEPLOY_DIR=/opt/app
//!
//! # Pull and restart two services, checking each one stays up
//! capataz deploy api web --health-check
//!
//! # Build on the host instead of pulling
//! capataz deploy worker --build --health-check
//!
//! # Show what would happen
//! capataz deploy api web --dry-run
//! ```
//!
//! Concurrent invocations against the same host are not serialized;
//! callers must not run two deployments of one project at once.

#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cancel;
pub mod clock;
pub mod cmd;
pub mod compose;
pub mod config;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod plan;
pub mod remote;
pub mod report;
pub mod ssh;
pub mod target;

pub use clock::SystemClock;
pub use compose::ComposeEngine;
pub use deploy::Orchestrator;
pub use engine::ContainerEngine;
pub use plan::{DeploymentPlan, Mode, PlanOptions};
pub use report::{DeploymentReport, Outcome};
pub use ssh::SshSession;
