//! Job queue feeding the refresh task
//!
//! A lightweight flume channel lets the daemon ask for an immediate refresh
//! (for example on SIGHUP) or stop the refresh loop, without reaching into
//! the scheduler itself.

/// Jobs the refresh task understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshJob {
    /// Rebuild the snapshot now instead of waiting for the next tick
    Refresh {
        /// Short label for logs, e.g. "SIGHUP"
        reason: &'static str,
    },
    /// Finish the current cycle, if any, and exit the loop
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
#[error("refresh task is no longer running")]
pub struct RefreshTaskGone;

/// Cloneable handle for sending jobs to the refresh task
#[derive(Debug, Clone)]
pub struct RefreshDispatcher {
    tx: flume::Sender<RefreshJob>,
}

impl RefreshDispatcher {
    /// Create a new dispatcher and receiver pair
    ///
    /// The dispatcher can be cloned and shared; the receiver goes to the
    /// refresh task.
    pub fn new() -> (Self, RefreshReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, RefreshReceiver { rx })
    }

    /// Dispatch a job. Fails only once the receiver has been dropped.
    pub fn dispatch(&self, job: RefreshJob) -> Result<(), RefreshTaskGone> {
        self.tx.send(job).map_err(|_| RefreshTaskGone)
    }

    pub fn request_refresh(&self, reason: &'static str) -> Result<(), RefreshTaskGone> {
        self.dispatch(RefreshJob::Refresh { reason })
    }

    pub fn shutdown(&self) -> Result<(), RefreshTaskGone> {
        self.dispatch(RefreshJob::Shutdown)
    }
}

/// Receiving end, owned by the refresh task
#[derive(Debug)]
pub struct RefreshReceiver {
    rx: flume::Receiver<RefreshJob>,
}

impl RefreshReceiver {
    /// Wait for the next job
    ///
    /// Returns None when every dispatcher has been dropped.
    pub async fn recv(&self) -> Option<RefreshJob> {
        self.rx.recv_async().await.ok()
    }
}
