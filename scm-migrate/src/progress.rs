//! Progress reporting and cancellation shared by capture and push.

use std::sync::Arc;

use tokio::sync::watch;

/// Receives `(message, percent)` updates. Implementations must return
/// promptly; the engine never waits on a sink.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, percent: u8);
}

/// Sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _message: &str, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8) + Send + Sync,
{
    fn report(&self, message: &str, percent: u8) {
        self(message, percent)
    }
}

/// Integer percentage of `done` over `total`, clamped to 0..=100.
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Cloneable cancellation signal observed by long-running walks.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives inside `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
