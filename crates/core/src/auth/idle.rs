use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs one deferred action after a period without activity.
///
/// Every `touch` cancels the pending timer before arming a new one, so at most
/// one timer is live at any time.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: Mutex::new(None),
        }
    }

    /// (Re)arm the timer with `on_expire`. Must be called inside a tokio runtime.
    pub fn touch<F>(&self, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timeout = self.timeout;
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expire.await;
        }));
    }

    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    /// Drop the handle without aborting. For use from inside the expiry action,
    /// which would otherwise cancel itself.
    pub fn detach(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.take();
    }

    pub fn is_armed(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
