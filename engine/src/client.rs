//! Composition root: everything a dashboard needs, built from [`EngineConfig`].

use crate::{
    connectivity::spawn_probe, error::Result, http::build_client, ConnectivityMonitor,
    EngineConfig, FileBackend, HttpRemote, LocalStore, Notification, Plant, Reachability,
    Synchronizer, SyncRuntime,
};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub type PlantSync = Synchronizer<Plant, HttpRemote<Plant>>;
pub type NotificationSync = Synchronizer<Notification, HttpRemote<Notification>>;

/// Both synchronizers, the runtime driving them and the reachability probe.
pub struct SproutClient {
    pub plants: Arc<PlantSync>,
    pub notifications: Arc<NotificationSync>,
    monitor: Arc<ConnectivityMonitor>,
    runtime: SyncRuntime,
    probe: Arc<HttpRemote<Plant>>,
    config: EngineConfig,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl SproutClient {
    /// Build the client. Probes reachability once so the monitor starts from
    /// a real signal; nothing else runs until [`SproutClient::start`].
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let store = match FileBackend::open(&config.cache_dir) {
            Ok(backend) => LocalStore::new(Arc::new(backend)),
            Err(e) => {
                tracing::warn!(
                    dir = %config.cache_dir.display(),
                    error = %e,
                    "Cache directory unavailable, keeping state in memory"
                );
                LocalStore::in_memory()
            }
        };

        let client = build_client(config.request_timeout)?;
        let token = config.api_token.clone();
        let plants_remote = HttpRemote::<Plant>::with_client(client.clone(), &config.api_url, token.clone());
        let notifications_remote =
            HttpRemote::<Notification>::with_client(client, &config.api_url, token);

        let probe = Arc::new(plants_remote.clone());
        let monitor = ConnectivityMonitor::new_shared(probe.is_reachable().await);

        let plants = Arc::new(Synchronizer::new(plants_remote, store.clone(), monitor.clone()));
        let notifications = Arc::new(Synchronizer::new(
            notifications_remote,
            store,
            monitor.clone(),
        ));

        let runtime = SyncRuntime::builder(monitor.clone())
            .collection(plants.clone(), config.poll_interval)
            .collection(notifications.clone(), config.poll_interval)
            .build();

        tracing::info!(api_url = %config.api_url, online = monitor.is_online(), "Sprout client ready");
        Ok(Self {
            plants,
            notifications,
            monitor,
            runtime,
            probe,
            config,
            probe_task: Mutex::new(None),
        })
    }

    /// Load configuration from the environment and connect.
    pub async fn from_env() -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config = EngineConfig::from_env()?;
        Ok(Self::connect(config).await?)
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Start the runtime and the periodic reachability probe.
    pub async fn start(&self) {
        self.runtime.start().await;
        let mut task = self.probe_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_none() {
            *task = Some(spawn_probe(
                self.monitor.clone(),
                self.probe.clone(),
                self.config.probe_interval,
            ));
        }
    }

    /// Stop all background work. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(task) = self
            .probe_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        self.runtime.dispose();
    }
}

impl Drop for SproutClient {
    fn drop(&mut self) {
        self.dispose();
    }
}
