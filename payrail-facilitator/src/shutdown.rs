//! Shutdown signal handling.
//!
//! [`ShutdownSignal`] listens for SIGTERM and SIGINT (Ctrl-C elsewhere) on a
//! background task and cancels a [`CancellationToken`] when one arrives.
//! The token drives axum's graceful shutdown; requests in flight, including
//! spawned settlements, are allowed to finish.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token on the first shutdown signal.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct ShutdownSignal {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // fallible on Unix only
    pub fn install() -> Result<Self, std::io::Error> {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let tracker = TaskTracker::new();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
                    () = trigger.cancelled() => return,
                }
                trigger.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            tracker.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C, shutting down"),
                    () = trigger.cancelled() => return,
                }
                trigger.cancel();
            });
        }

        tracker.close();
        Ok(Self { tracker, token })
    }

    /// A token cancelled when shutdown begins.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Triggers shutdown without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Waits until shutdown begins and the listener task has exited.
    pub async fn wait(&self) {
        self.token.cancelled().await;
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn manual_trigger_releases_waiters() {
        let shutdown = ShutdownSignal::install().unwrap();
        let token = shutdown.token();
        assert!(!token.is_cancelled());
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
        assert!(token.is_cancelled());
    }
}
