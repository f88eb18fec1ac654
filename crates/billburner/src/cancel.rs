//! Process-wide cancellation.
//!
//! A single token is shared by the interrupt listener, the watchdog and the
//! runner. Whichever fires first records its reason; the runner observes the
//! token between workflow steps and abandons the step in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The operating system delivered an interrupt or termination signal.
    Interrupt,
    /// The wall-clock watchdog expired.
    Watchdog,
}

impl CancelReason {
    /// Process exit code associated with this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            CancelReason::Interrupt => 1,
            CancelReason::Watchdog => 2,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Interrupt => write!(f, "interrupt"),
            CancelReason::Watchdog => write!(f, "watchdog"),
        }
    }
}

/// Cloneable cancellation handle. The first reason recorded wins.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record a cancellation. Later calls keep the first reason.
    pub fn cancel(&self, reason: CancelReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// The recorded reason, if cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives as long as `self`, so this only errors if the
            // token itself is gone.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `token` with [`CancelReason::Watchdog`] after `after` elapses.
pub fn spawn_watchdog(token: CancelToken, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        warn!("watchdog expired after {}s", after.as_secs());
        token.cancel(CancelReason::Watchdog);
    })
}
