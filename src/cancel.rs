//! Cooperative cancellation for a running plan.
//!
//! An interrupt never aborts a remote command half way. The
//! orchestrator checks the token between targets, so the in-flight
//! target finishes and the rest are reported as skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::error::DeployResult;

/// Exit status conventionally used after SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on the first Ctrl-C. A second Ctrl-C exits the
/// process immediately.
pub fn install_ctrl_c(token: CancelToken) -> DeployResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "could not listen for Ctrl-C");
                    return;
                }
                tracing::warn!(
                    "interrupt received: finishing the current target, \
                     remaining targets will be skipped"
                );
                token.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::error!("second interrupt, exiting now");
                    std::process::exit(INTERRUPTED_EXIT);
                }
            });
        })?;

    Ok(())
}
