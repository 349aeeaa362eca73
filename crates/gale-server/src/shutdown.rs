//! Node lifecycle: one cancellation token for the listener and every open
//! connection, plus the named background tasks (peer sweep, member loop)
//! that shutdown waits for.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to the tracked tasks during [`ShutdownCoordinator::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks that exited within the grace period.
    pub finished: Vec<&'static str>,
    /// Tasks still running at the deadline; these were aborted.
    pub aborted: Vec<&'static str>,
}

/// Shutdown signal and background-task registry of one node.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Fresh coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that fires when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a background task to wait for on drain.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        if self.is_shutting_down() {
            debug!(task = name, "tracking task after shutdown; aborting it");
            handle.abort();
            return;
        }
        self.tasks.lock().push((name, handle));
    }

    /// Names of tracked tasks, in registration order.
    pub fn tracked(&self) -> Vec<&'static str> {
        self.tasks.lock().iter().map(|(name, _)| *name).collect()
    }

    /// Signal shutdown, give tracked tasks `grace` to exit, and abort the
    /// rest. A second call has nothing left to wait for.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        self.shutdown();
        let pending = std::mem::take(&mut *self.tasks.lock());
        info!(tasks = pending.len(), grace = ?grace, "draining background tasks");

        let mut report = DrainReport::default();
        let deadline = tokio::time::Instant::now() + grace;
        for (name, mut handle) in pending {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Err(error)) if error.is_panic() => {
                    warn!(task = name, "background task panicked");
                    report.finished.push(name);
                }
                Ok(_) => report.finished.push(name),
                Err(_elapsed) => {
                    handle.abort();
                    report.aborted.push(name);
                }
            }
        }
        if !report.aborted.is_empty() {
            warn!(aborted = ?report.aborted, "shutdown grace period elapsed");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(coord.token().is_cancelled());
    }

    #[tokio::test]
    async fn cooperative_tasks_finish() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("sweep", tokio::spawn(async move { token.cancelled().await }));
        assert_eq!(coord.tracked(), vec!["sweep"]);

        let report = coord.drain(Duration::from_secs(1)).await;
        assert_eq!(report.finished, vec!["sweep"]);
        assert!(report.aborted.is_empty());
        assert!(coord.tracked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_tasks_are_aborted() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("member", tokio::spawn(async move { token.cancelled().await }));
        coord.track(
            "stuck",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(300)).await;
            }),
        );

        let report = coord.drain(Duration::from_millis(100)).await;
        assert_eq!(report.finished, vec!["member"]);
        assert_eq!(report.aborted, vec!["stuck"]);
    }

    #[tokio::test]
    async fn tracking_after_shutdown_aborts() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.track("late", tokio::spawn(std::future::pending::<()>()));
        assert!(coord.tracked().is_empty());
        assert_eq!(coord.drain(Duration::from_millis(10)).await, DrainReport::default());
    }
}
