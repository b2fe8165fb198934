//! Graceful shutdown coordination
//!
//! One manager per process, passed explicitly to every long-lived task.
//! Cleanup callbacks run sequentially with a per-callback timeout; a failing
//! callback is logged and skipped so the rest still run.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

/// Per-callback budget during shutdown
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

type CleanupCallback = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Coordinates graceful termination
pub struct ShutdownManager {
    shutting_down: AtomicBool,
    complete: Notify,
    callbacks: Mutex<Vec<(String, CleanupCallback)>>,
}

impl ShutdownManager {
    /// Create a manager
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shutting_down: AtomicBool::new(false),
            complete: Notify::new(),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Whether shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register a named async cleanup callback
    pub async fn register_cleanup<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .await
            .push((name.into(), Box::new(callback)));
    }

    /// Begin graceful shutdown; idempotent
    pub async fn initiate_shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let callbacks = self.callbacks.lock().await;
        info!(callbacks = callbacks.len(), "shutdown initiated");

        for (name, callback) in callbacks.iter() {
            match tokio::time::timeout(CLEANUP_TIMEOUT, callback()).await {
                Ok(()) => {}
                Err(_) => warn!(callback = %name, "cleanup callback timed out"),
            }
        }
        drop(callbacks);

        self.complete.notify_waiters();
        info!("shutdown complete");
    }

    /// Wait until shutdown has run all callbacks
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        self.complete.notified().await;
    }
}

/// Wire Ctrl+C to shutdown initiation
pub async fn listen_for_signals(manager: Arc<ShutdownManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "signal listener failed");
        return;
    }
    info!("interrupt received");
    manager.initiate_shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_callbacks_run_in_registration_order() {
        let manager = ShutdownManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            manager
                .register_cleanup(format!("cb-{i}"), move || {
                    let order = order.clone();
                    Box::pin(async move {
                        order.lock().await.push(i);
                    })
                })
                .await;
        }

        manager.initiate_shutdown().await;
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
        assert!(manager.is_shutting_down());
    }

    #[tokio::test]
    async fn test_initiate_is_idempotent() {
        let manager = ShutdownManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager
            .register_cleanup("counter", move || {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .await;

        manager.initiate_shutdown().await;
        manager.initiate_shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
