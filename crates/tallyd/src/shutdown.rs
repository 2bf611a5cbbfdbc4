//! Shutdown coordination.
//!
//! A `Shutdown` is one cancellation token plus a tracker of every task
//! spawned through it. The accept loop and each connection handler race
//! their blocking waits against [`Shutdown::cancelled`], so requesting
//! shutdown unblocks them without any polling. The tracker lets the server
//! wait until every handler has finished its cleanup.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Process-wide shutdown signal and task tracker.
///
/// Cheap to clone; all clones share the same signal and tracker.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    /// Set once, never cleared
    token: CancellationToken,

    /// Tasks that must finish before the server counts as drained
    tracker: TaskTracker,
}

impl Shutdown {
    /// Creates a coordinator with the signal not yet set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal. Calling it again has no effect.
    pub fn request_shutdown(&self) {
        if !self.token.is_cancelled() {
            debug!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether the signal has been set.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once shutdown has been requested.
    ///
    /// Meant to be raced against a blocking wait in `tokio::select!`.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Spawns a task that [`drain`](Self::drain) will wait for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of tracked tasks still running.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Requests shutdown when the process receives SIGINT or SIGTERM.
    ///
    /// Spawns an untracked task; it ends as soon as either a signal arrives
    /// or shutdown is requested some other way.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = wait_for_shutdown_signal() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error waiting for shutdown signal");
                    }
                    info!("Shutdown signal received");
                    shutdown.request_shutdown();
                }
            }
        })
    }

    /// Stops tracking new tasks and waits for running ones to finish.
    ///
    /// Returns `true` if every task finished within `grace`.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();

        let remaining = self.tracker.len();
        if remaining > 0 {
            debug!(remaining, "Waiting for tasks to finish");
        }

        match timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    grace_ms = grace.as_millis() as u64,
                    "Tasks still running after shutdown grace period"
                );
                false
            }
        }
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_signal_starts_clear() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_request_is_idempotent_and_sticky() {
        let shutdown = Shutdown::new();
        shutdown.request_shutdown();
        shutdown.request_shutdown();
        assert!(shutdown.is_shutdown_requested());
        assert!(shutdown.clone().is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_cancelled_unblocks_waiter() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let task = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        shutdown.request_shutdown();
        let result = timeout(Duration::from_secs(1), task).await;
        assert!(result.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_drain_waits_for_tracked_tasks() {
        let shutdown = Shutdown::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let worker = shutdown.clone();
        shutdown.spawn(async move {
            worker.cancelled().await;
            let _ = release_rx.await;
        });
        assert_eq!(shutdown.active_tasks(), 1);

        shutdown.request_shutdown();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = release_tx.send(());
        });

        assert!(shutdown.drain(Duration::from_secs(1)).await);
        assert_eq!(shutdown.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_task() {
        let shutdown = Shutdown::new();
        shutdown.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert!(!shutdown.drain(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_signal_listener_exits_on_manual_shutdown() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listen_for_signals();

        shutdown.request_shutdown();
        assert!(timeout(Duration::from_secs(1), listener).await.is_ok());
    }

    #[tokio::test]
    async fn test_drain_with_no_tasks_is_immediate() {
        let shutdown = Shutdown::new();
        assert!(shutdown.drain(Duration::from_millis(10)).await);
    }
}
