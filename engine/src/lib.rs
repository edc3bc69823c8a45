//! # Sprout Engine
//!
//! An offline-first sync engine for the plant-monitoring dashboard.
//!
//! The engine keeps two client-resident collections (plants and
//! notifications) consistent between the remote resource API, a durable local
//! cache and an in-memory view, while tolerating intermittent connectivity.
//!
//! ## Core Concepts
//!
//! ### Synchronizers
//!
//! A [`Synchronizer`] owns one collection. Every mutation is applied
//! optimistically to its snapshot and persisted to the [`LocalStore`], then
//! either confirmed remotely or appended to the [`PendingQueue`]. Optimistic
//! changes are never rolled back.
//!
//! ### Errors
//!
//! Remote failures carry an explicit [`ErrorKind`]:
//! - [`ErrorKind::RetryableNetwork`] - queued, surfaced only as a stale-data notice
//! - [`ErrorKind::TerminalRequest`] - dropped, surfaced once via `last_error`
//! - [`ErrorKind::AuthExpired`] - surfaced immediately
//! - [`ErrorKind::Offline`] - the operation needs connectivity
//!
//! Local storage failures are logged and never returned.
//!
//! ### Connectivity
//!
//! The [`ConnectivityMonitor`] emits one edge per transition. The
//! [`SyncRuntime`] reacts to `Online` by draining every queue and running a
//! reconciling fetch, and pauses polling while `Offline`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sprout_engine::{EngineConfig, SproutClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = SproutClient::connect(EngineConfig::new("http://localhost:3000")).await?;
//! client.start().await;
//!
//! let plants = client.plants.fetch_all(None).await?;
//! println!("{} plants, stale: {}", plants.records.len(), plants.is_stale());
//!
//! client.notifications.mark_read(1).await?;
//! println!("{} unread", client.notifications.unread_count());
//!
//! client.dispose();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
mod notifications;
pub mod operation;
mod plants;
pub mod poller;
pub mod queue;
pub mod record;
pub mod remote;
pub mod runtime;
pub mod snapshot;
pub mod store;
pub mod synchronizer;

// Re-export main types at crate root
pub use client::{NotificationSync, PlantSync, SproutClient};
pub use config::{ConfigError, EngineConfig};
pub use connectivity::{spawn_probe, Connectivity, ConnectivityMonitor, Edge, Reachability};
pub use error::{Error, ErrorKind, RemoteError, SyncError};
pub use http::HttpRemote;
pub use operation::{OperationId, PendingOperation, Verb};
pub use poller::{PollingScheduler, Refresh, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use queue::{DrainReport, DrainStep, DroppedOperation, PendingQueue};
pub use record::{
    Filters, Notification, NotificationDraft, Patch, Plant, PlantDraft, Resource, ResourceKind,
};
pub use remote::{RemoteApi, RemoteResult};
pub use runtime::{SyncRuntime, SyncRuntimeBuilder};
pub use snapshot::{CacheEntry, CollectionSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{Backend, FileBackend, LocalStore, MemoryBackend, StoreError};
pub use synchronizer::{ClearScope, DataSource, FetchOutcome, Mutation, MutationStatus, Synchronizer};

/// Server-assigned record identifier.
pub type RecordId = i64;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
