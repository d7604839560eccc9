//! Cooperative shutdown shared by every worker.

use log::warn;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Set once, observed by every loop iteration and every blocking wait
#[derive(Clone, Default)]
pub struct StopFlag {
    inner: Arc<Inner>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut stopped = match self.inner.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *stopped = true;
        self.inner.wake.notify_all();
    }

    pub fn is_set(&self) -> bool {
        match self.inner.stopped.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleep for up to `timeout`, waking early if the flag is set.
    /// Returns whether the flag is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = match self.inner.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match self.inner.wake.wait_timeout_while(guard, timeout, |stopped| !*stopped) {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

/// Resolves on SIGINT or SIGTERM and names the signal
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!(target: "system", "Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

/// Join a worker thread, giving up after `timeout`.
///
/// `None` means the thread is still running (or panicked); it is left
/// detached and dies with the process.
pub async fn join_with_timeout<T: Send + 'static>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let name = handle.thread().name().unwrap_or("worker").to_string();
    let joiner = tokio::task::spawn_blocking(move || handle.join());
    match tokio::time::timeout(timeout, joiner).await {
        Ok(Ok(Ok(value))) => Some(value),
        Ok(Ok(Err(_))) => {
            warn!(target: "system", "Thread {} panicked", name);
            None
        }
        Ok(Err(e)) => {
            warn!(target: "system", "Join task for {} failed: {}", name, e);
            None
        }
        Err(_) => {
            warn!(target: "system", "Thread {} did not stop within {:?}", name, timeout);
            None
        }
    }
}
