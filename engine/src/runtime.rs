//! Sync runtime: wires connectivity edges to synchronizers and pollers.

use crate::{ConnectivityMonitor, Edge, PollingScheduler, Refresh};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

struct Collection {
    target: Arc<dyn Refresh>,
    poller: PollingScheduler,
}

struct Collections(Vec<Collection>);

impl Collections {
    fn start_polling(&self) {
        self.0.iter().for_each(|c| c.poller.start());
    }

    fn stop_polling(&self) {
        self.0.iter().for_each(|c| c.poller.stop());
    }

    /// Drain and reconcile every collection concurrently.
    async fn reconnect(&self) {
        join_all(self.0.iter().map(|c| c.target.reconnect())).await;
    }

    async fn on_edge(&self, edge: Edge) {
        match edge {
            Edge::Online => {
                self.stop_polling();
                self.reconnect().await;
                self.start_polling();
            }
            Edge::Offline => self.stop_polling(),
        }
    }
}

/// Owns the background work of the engine.
///
/// Nothing runs until [`SyncRuntime::start`]; [`SyncRuntime::dispose`] stops
/// every timer and listener and may be called more than once.
pub struct SyncRuntime {
    monitor: Arc<ConnectivityMonitor>,
    collections: Arc<Collections>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SyncRuntime {
    pub fn builder(monitor: Arc<ConnectivityMonitor>) -> SyncRuntimeBuilder {
        SyncRuntimeBuilder {
            monitor,
            collections: Vec::new(),
        }
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn is_polling(&self) -> bool {
        self.collections.0.iter().any(|c| c.poller.is_running())
    }

    /// Reconcile if online, start pollers and begin listening for edges.
    pub async fn start(&self) {
        if self.lock().is_some() {
            return;
        }

        // Subscribe before the initial reconcile so no edge is missed.
        let mut edges = self.monitor.subscribe();
        if self.monitor.is_online() {
            self.collections.reconnect().await;
            self.collections.start_polling();
        }

        let collections = self.collections.clone();
        let monitor = self.monitor.clone();
        let listener = tokio::spawn(async move {
            loop {
                match edges.recv().await {
                    Ok(edge) => collections.on_edge(edge).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Connectivity edges lagged, resynchronizing");
                        let edge = if monitor.is_online() {
                            Edge::Online
                        } else {
                            Edge::Offline
                        };
                        collections.on_edge(edge).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut slot = self.lock();
        if slot.is_some() {
            // Lost a race with a concurrent start.
            listener.abort();
            return;
        }
        *slot = Some(listener);
        tracing::info!(
            collections = self.collections.0.len(),
            online = self.monitor.is_online(),
            "Sync runtime started"
        );
    }

    /// Stop pollers and the edge listener.
    pub fn dispose(&self) {
        if let Some(listener) = self.lock().take() {
            listener.abort();
            tracing::info!("Sync runtime disposed");
        }
        self.collections.stop_polling();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("collections", &self.collections.0.len())
            .field("polling", &self.is_polling())
            .finish()
    }
}

pub struct SyncRuntimeBuilder {
    monitor: Arc<ConnectivityMonitor>,
    collections: Vec<Collection>,
}

impl SyncRuntimeBuilder {
    /// Register a collection with its own polling scheduler. Intervals below
    /// [`crate::MIN_POLL_INTERVAL`] are raised to it.
    #[must_use]
    pub fn collection(mut self, target: Arc<dyn Refresh>, poll_interval: Duration) -> Self {
        let poller = PollingScheduler::new(target.clone(), poll_interval);
        self.collections.push(Collection { target, poller });
        self
    }

    pub fn build(self) -> SyncRuntime {
        SyncRuntime {
            monitor: self.monitor,
            collections: Arc::new(Collections(self.collections)),
            listener: Mutex::new(None),
        }
    }
}
