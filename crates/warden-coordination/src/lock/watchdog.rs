// Lock watchdog
// Extends a held lock at a third of its TTL until stopped or until the lock is lost

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::LockManager;
use super::model::HolderToken;

/// Background renewal for long-running critical sections
pub struct LockWatchdog {
    key: String,
    stop_tx: mpsc::Sender<()>,
    lost: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LockWatchdog {
    /// Start extending `key` every `ttl / 3`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(manager: Arc<LockManager>, key: &str, token: HolderToken, ttl: Duration) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let lost = Arc::new(AtomicBool::new(false));
        let interval = (ttl / 3).max(Duration::from_millis(1));

        let task_key = key.to_string();
        let task_lost = lost.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.extend(&task_key, &token, ttl).await {
                            Ok(true) => {}
                            Ok(false) => {
                                warn!(key = %task_key, "Lock lost before watchdog renewal");
                                task_lost.store(true, Ordering::SeqCst);
                                break;
                            }
                            Err(e) => {
                                // Keep trying: the record is still valid until its TTL runs out
                                warn!(key = %task_key, error = %e, "Lock renewal failed");
                            }
                        }
                    }
                    _ = stop_rx.recv() => {
                        break;
                    }
                }
            }
            debug!(key = %task_key, "Lock watchdog exited");
        });

        info!(key = %key, interval_ms = interval.as_millis() as u64, "Lock watchdog started");

        Self {
            key: key.to_string(),
            stop_tx,
            lost,
            handle: Some(handle),
        }
    }

    /// Whether a renewal found the lock held by someone else
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Stop renewing and wait for the task to exit
    ///
    /// Returns `false` if the lock was lost while the watchdog ran.
    pub async fn stop(mut self) -> bool {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(key = %self.key, "Lock watchdog stopped");
        !self.is_lost()
    }
}

impl Drop for LockWatchdog {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
