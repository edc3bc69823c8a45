//! Resource synchronizer.
//!
//! One instance per collection. It owns the collection snapshot and the
//! pending queue, applies every mutation optimistically, and decides per
//! failure kind whether an operation is queued, dropped or surfaced.
//!
//! Local state lives behind a synchronous mutex that is never held across an
//! `.await`: every optimistic update, snapshot replacement and cache write is
//! atomic with respect to other local operations, and suspension only happens
//! at remote calls.

use crate::{
    error::Result, CollectionSnapshot, ConnectivityMonitor, DrainReport, DrainStep,
    DroppedOperation, Error, ErrorKind, Filters, LocalStore, OperationId, Patch, PendingOperation,
    PendingQueue, RecordId, Refresh, RemoteApi, RemoteError, RemoteResult, Resource, ResourceKind,
    SyncError, Verb,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Where the records of a fetch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Remote,
    Cache,
}

/// Result of [`Synchronizer::fetch_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<R> {
    pub records: Vec<R>,
    pub source: DataSource,
    /// Non-blocking notice shown alongside cached data.
    pub warning: Option<SyncError>,
}

impl<R> FetchOutcome<R> {
    /// Cached or offline data is being shown instead of a fresh server copy.
    pub fn is_stale(&self) -> bool {
        self.source == DataSource::Cache
    }
}

/// How far a mutation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    /// The server accepted it.
    Confirmed,
    /// The server accepted it but a newer local change won; the response was discarded.
    Superseded,
    /// Waiting in the pending queue.
    Queued,
}

/// Result of [`Synchronizer::mutate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<R> {
    /// The record as the snapshot now holds it.
    pub record: R,
    pub status: MutationStatus,
    pub warning: Option<SyncError>,
}

/// What a bulk clear removes.
///
/// Only scopes the remote bulk delete can express exist, so the local and
/// remote removal always cover the same records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Every record.
    All,
    /// Records marked read. Needs [`Resource::TRACKS_READ_STATE`].
    Read,
}

impl ClearScope {
    fn read_only(self) -> bool {
        self == ClearScope::Read
    }

    fn matches<R: Resource>(self, record: &R) -> bool {
        match self {
            ClearScope::All => true,
            ClearScope::Read => record.is_read(),
        }
    }
}

struct State<R> {
    snapshot: CollectionSnapshot<R>,
    queue: PendingQueue,
    /// Applied optimistically, remote call not finished, not queued.
    in_flight: Vec<PendingOperation>,
    /// Bumped by every local mutation of a record; stale confirmations compare against it.
    revisions: HashMap<RecordId, u64>,
    /// The store holds exactly the in-memory snapshot.
    cache_current: bool,
    last_error: Option<SyncError>,
}

impl<R: Resource> State<R> {
    fn bump(&mut self, id: RecordId) -> u64 {
        let revision = self.revisions.entry(id).or_insert(0);
        *revision += 1;
        *revision
    }

    /// Re-apply queued, then in-flight operations on top of freshly loaded state.
    fn rebase_pending(&mut self) {
        let State {
            snapshot,
            queue,
            in_flight,
            ..
        } = self;
        for op in queue.iter().chain(in_flight.iter()) {
            match &op.verb {
                Verb::Update { payload } => {
                    if let Err(e) = snapshot.patch(op.target_id, payload) {
                        tracing::warn!(op_id = %op.op_id, error = %e, "Pending patch no longer applies");
                    }
                }
                Verb::Delete => {
                    snapshot.remove(op.target_id);
                }
            }
        }
    }

    fn settle(&mut self, op_id: &OperationId) {
        self.in_flight.retain(|op| &op.op_id != op_id);
    }

    fn view(&self, filters: &Filters) -> Vec<R> {
        self.snapshot
            .records()
            .iter()
            .filter(|r| filters.matches(*r))
            .cloned()
            .collect()
    }
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps one collection consistent between the remote, the local store and memory.
pub struct Synchronizer<R: Resource, A> {
    remote: A,
    store: LocalStore,
    monitor: Arc<ConnectivityMonitor>,
    state: Mutex<State<R>>,
    drain_lock: tokio::sync::Mutex<()>,
    /// Held from the readiness check of a live call until it is confirmed,
    /// queued or rejected, so remote writes land in local order.
    write_lock: tokio::sync::Mutex<()>,
    loading: AtomicUsize,
    changes: watch::Sender<u64>,
    _resource: PhantomData<fn() -> R>,
}

impl<R, A> Synchronizer<R, A>
where
    R: Resource,
    A: RemoteApi<R>,
{
    /// Build a synchronizer, rehydrating snapshot and queue from the store.
    pub fn new(remote: A, store: LocalStore, monitor: Arc<ConnectivityMonitor>) -> Self {
        let snapshot = store.read_snapshot::<R>().unwrap_or_default();
        let queue = PendingQueue::load(store.clone(), R::KIND);
        tracing::debug!(
            resource = %R::KIND,
            cached = snapshot.len(),
            pending = queue.len(),
            "Synchronizer created"
        );
        let (changes, _) = watch::channel(0);
        Self {
            remote,
            store,
            monitor,
            state: Mutex::new(State {
                snapshot,
                queue,
                in_flight: Vec::new(),
                revisions: HashMap::new(),
                cache_current: true,
                last_error: None,
            }),
            drain_lock: tokio::sync::Mutex::new(()),
            write_lock: tokio::sync::Mutex::new(()),
            loading: AtomicUsize::new(0),
            changes,
            _resource: PhantomData,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        R::KIND
    }

    /// Current records.
    pub fn snapshot(&self) -> Vec<R> {
        self.state().snapshot.records().to_vec()
    }

    /// Read the snapshot without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&CollectionSnapshot<R>) -> T) -> T {
        f(&self.state().snapshot)
    }

    pub fn get(&self, id: RecordId) -> Option<R> {
        self.state().snapshot.get(id).cloned()
    }

    /// A fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.state().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.state().last_error = None;
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Queued operations, oldest first.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.state().queue.iter().cloned().collect()
    }

    /// Give up on a queued operation without replaying it.
    pub fn abandon_pending(&self, op_id: &OperationId) -> Option<PendingOperation> {
        let op = self.state().queue.acknowledge(op_id)?;
        tracing::info!(resource = %R::KIND, op_id = %op.op_id, "Abandoned pending operation");
        Some(op)
    }

    /// Receives a new value after every snapshot change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Load the collection.
    ///
    /// Online: fetch from the remote, replace the snapshot and persist it; a
    /// remote failure falls back to the cache with a stale-data warning.
    /// Offline: read from the local store.
    pub async fn fetch_all(&self, filters: Option<&Filters>) -> Result<FetchOutcome<R>> {
        let filters = filters.cloned().unwrap_or_default();
        if !self.is_online() {
            return Ok(self.load_cached(&filters, None));
        }

        let _loading = LoadingGuard::new(&self.loading);
        if self.has_pending() {
            self.drain_pending().await;
        }
        self.fetch_remote(&filters).await
    }

    /// Drain the queue, then reconcile with a full fetch.
    pub async fn reconnect(&self) -> Result<FetchOutcome<R>> {
        let _loading = LoadingGuard::new(&self.loading);
        let report = self.drain_pending().await;
        tracing::info!(
            resource = %R::KIND,
            replayed = report.replayed,
            dropped = report.dropped.len(),
            remaining = report.remaining,
            "Reconnected"
        );
        self.fetch_remote(&Filters::new()).await
    }

    /// Apply `patch` to record `id` optimistically, then confirm it remotely
    /// or queue it. Optimistic changes are never rolled back.
    pub async fn mutate(&self, id: RecordId, patch: Patch) -> Result<Mutation<R>> {
        let op = PendingOperation::update(R::KIND, id, patch.clone());
        let (optimistic, revision) = {
            let mut state = self.state();
            let record = state
                .snapshot
                .patch(id, &patch)?
                .cloned()
                .ok_or(Error::RecordNotFound(id))?;
            let revision = state.bump(id);
            state.in_flight.push(op.clone());
            self.commit(&mut state);
            (record, revision)
        };

        let _writing = self.write_lock.lock().await;
        if !self.ready_for_remote().await {
            self.enqueue(op);
            return Ok(Mutation {
                record: optimistic,
                status: MutationStatus::Queued,
                warning: None,
            });
        }

        match self.remote.update(id, &patch).await {
            Ok(confirmed) => Ok(self.confirm(&op.op_id, confirmed, revision)),
            Err(err) if err.is_retryable() => {
                tracing::warn!(resource = %R::KIND, id, error = %err, "Update deferred");
                self.enqueue(op);
                Ok(Mutation {
                    record: optimistic,
                    status: MutationStatus::Queued,
                    warning: Some(SyncError::from_remote(&err, true)),
                })
            }
            Err(err) => {
                self.state().settle(&op.op_id);
                Err(self.surface(&err).into())
            }
        }
    }

    /// Remove record `id` immediately, then delete it remotely or queue the
    /// delete. Removal is terminal from the caller's point of view.
    pub async fn remove(&self, id: RecordId) -> Result<MutationStatus> {
        let op = PendingOperation::delete(R::KIND, id);
        {
            let mut state = self.state();
            if state.snapshot.remove(id).is_none() {
                return Err(Error::RecordNotFound(id));
            }
            state.bump(id);
            state.in_flight.push(op.clone());
            self.commit(&mut state);
        }

        let _writing = self.write_lock.lock().await;
        if !self.ready_for_remote().await {
            self.enqueue(op);
            return Ok(MutationStatus::Queued);
        }

        let result: Result<MutationStatus> = match self.remote.delete(id).await {
            Ok(()) => Ok(MutationStatus::Confirmed),
            Err(err) if err.is_not_found() => Ok(MutationStatus::Confirmed),
            Err(err) if err.is_retryable() => {
                tracing::warn!(resource = %R::KIND, id, error = %err, "Delete deferred");
                self.enqueue(op);
                return Ok(MutationStatus::Queued);
            }
            Err(err) => Err(self.surface(&err).into()),
        };
        self.state().settle(&op.op_id);
        result
    }

    /// Create a record. Requires connectivity: a locally invented id could
    /// not be reconciled with the one the server assigns.
    pub async fn create(&self, draft: R::Draft) -> Result<R> {
        if !self.is_online() {
            return Err(SyncError::offline(format!(
                "creating {} requires connectivity",
                R::KIND
            ))
            .into());
        }
        let _writing = self.write_lock.lock().await;
        if self.has_pending() {
            self.drain_pending().await;
        }

        match self.remote.create(&draft).await {
            Ok(record) => {
                let mut state = self.state();
                state.bump(record.id());
                state.snapshot.upsert(record.clone());
                self.commit(&mut state);
                Ok(record)
            }
            Err(err) => Err(self.surface(&err).into()),
        }
    }

    /// Remove every record in `scope` locally and issue one remote bulk
    /// delete. Online only and never queued: bulk deletes are not safely
    /// replayable. The local removal is kept even if the remote call fails.
    pub async fn bulk_clear(&self, scope: ClearScope) -> Result<Vec<R>> {
        if scope == ClearScope::Read && !R::TRACKS_READ_STATE {
            return Err(Error::UnsupportedScope(R::KIND));
        }
        if !self.is_online() {
            return Err(SyncError::offline(format!(
                "clearing {} requires connectivity",
                R::KIND
            ))
            .into());
        }
        let _writing = self.write_lock.lock().await;
        if self.has_pending() {
            self.drain_pending().await;
        }

        let removed = {
            let mut state = self.state();
            let removed = state.snapshot.retain(|r| !scope.matches(r));
            for record in &removed {
                state.bump(record.id());
            }
            self.commit(&mut state);
            removed
        };

        match self.remote.bulk_delete(scope.read_only()).await {
            Ok(()) => {
                tracing::info!(resource = %R::KIND, removed = removed.len(), "Bulk clear confirmed");
                Ok(removed)
            }
            Err(err) => Err(self.surface(&err).into()),
        }
    }

    /// Replay queued operations in order.
    ///
    /// Stops at the first retryable or auth failure; drops terminal failures
    /// and keeps going. Draining an empty queue issues no remote calls.
    pub async fn drain_pending(&self) -> DrainReport {
        let _draining = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        loop {
            let next = self.state().queue.front().cloned();
            let Some(op) = next else {
                break;
            };
            if !self.is_online() {
                report.halted = Some(RemoteError::offline("connectivity lost while draining"));
                break;
            }

            match self.replay(&op).await {
                Ok(()) => {
                    self.state().queue.acknowledge(&op.op_id);
                    report.replayed += 1;
                }
                Err(err) => match DrainStep::after(&err) {
                    DrainStep::Drop => {
                        tracing::warn!(
                            resource = %R::KIND,
                            op_id = %op.op_id,
                            target_id = op.target_id,
                            error = %err,
                            "Dropping rejected operation"
                        );
                        {
                            let mut state = self.state();
                            state.queue.acknowledge(&op.op_id);
                            state.last_error = Some(SyncError::from_remote(&err, true));
                        }
                        report.dropped.push(DroppedOperation { op, error: err });
                    }
                    DrainStep::Halt => {
                        tracing::debug!(resource = %R::KIND, error = %err, "Draining halted");
                        if err.kind == ErrorKind::AuthExpired {
                            self.state().last_error = Some(SyncError::from_remote(&err, true));
                        }
                        report.halted = Some(err);
                        break;
                    }
                },
            }
        }

        report.remaining = self.state().queue.len();
        report
    }

    async fn replay(&self, op: &PendingOperation) -> RemoteResult<()> {
        match &op.verb {
            Verb::Update { payload } => self.remote.update(op.target_id, payload).await.map(drop),
            Verb::Delete => match self.remote.delete(op.target_id).await {
                Err(err) if err.is_not_found() => Ok(()),
                other => other,
            },
        }
    }

    async fn fetch_remote(&self, filters: &Filters) -> Result<FetchOutcome<R>> {
        match self.remote.list(filters).await {
            Ok(records) => {
                let mut state = self.state();
                if filters.is_empty() {
                    state.snapshot = CollectionSnapshot::from_records(records);
                } else {
                    state.snapshot.retain(|r| !filters.matches(r));
                    for record in records {
                        state.snapshot.upsert(record);
                    }
                }
                state.rebase_pending();
                state.last_error = None;
                self.commit(&mut state);
                Ok(FetchOutcome {
                    records: state.view(filters),
                    source: DataSource::Remote,
                    warning: None,
                })
            }
            Err(err) if err.kind == ErrorKind::AuthExpired => {
                let error = self.surface(&err);
                self.load_cached(filters, None);
                Err(error.into())
            }
            Err(err) => {
                tracing::warn!(resource = %R::KIND, error = %err, "Fetch failed, using cached data");
                let warning = SyncError::from_remote(&err, true);
                self.state().last_error = Some(warning.clone());
                Ok(self.load_cached(filters, Some(warning)))
            }
        }
    }

    /// Serve the cached collection. Memory is only replaced from the store
    /// while the store is known to hold the latest committed snapshot; after
    /// a failed write the in-memory copy is newer and stays authoritative.
    fn load_cached(&self, filters: &Filters, warning: Option<SyncError>) -> FetchOutcome<R> {
        let mut state = self.state();
        if !state.cache_current {
            tracing::debug!(resource = %R::KIND, "Store is behind memory, serving memory");
        } else if let Some(cached) = self.store.read_snapshot::<R>() {
            state.snapshot = cached;
            state.rebase_pending();
            self.changes.send_modify(|v| *v = v.wrapping_add(1));
        }
        FetchOutcome {
            records: state.view(filters),
            source: DataSource::Cache,
            warning,
        }
    }

    fn confirm(&self, op_id: &OperationId, confirmed: R, revision: u64) -> Mutation<R> {
        let mut state = self.state();
        state.settle(op_id);
        let id = confirmed.id();
        let current = state.revisions.get(&id).copied().unwrap_or_default();
        if current != revision || !state.snapshot.contains(id) {
            tracing::debug!(resource = %R::KIND, id, "Discarding superseded confirmation");
            return Mutation {
                record: state.snapshot.get(id).cloned().unwrap_or(confirmed),
                status: MutationStatus::Superseded,
                warning: None,
            };
        }
        state.snapshot.upsert(confirmed.clone());
        self.commit(&mut state);
        Mutation {
            record: confirmed,
            status: MutationStatus::Confirmed,
            warning: None,
        }
    }

    /// Online with an empty queue, draining first if needed. A new operation
    /// must go behind anything that is still queued. Call with `write_lock` held.
    async fn ready_for_remote(&self) -> bool {
        if !self.is_online() {
            return false;
        }
        !self.has_pending() || self.drain_pending().await.is_clear()
    }

    fn has_pending(&self) -> bool {
        !self.state().queue.is_empty()
    }

    /// Move an in-flight operation to the queue. Its effect is already in the
    /// snapshot, rebased over any fetch that landed while it was in flight.
    fn enqueue(&self, op: PendingOperation) {
        let mut state = self.state();
        state.settle(&op.op_id);
        state.queue.enqueue(op);
    }

    /// Record a user-visible error once and hand it back.
    fn surface(&self, err: &RemoteError) -> SyncError {
        let error = SyncError::from_remote(err, true);
        match err.kind {
            ErrorKind::AuthExpired => {
                tracing::error!(resource = %R::KIND, error = %err, "Authentication expired")
            }
            _ => tracing::warn!(resource = %R::KIND, error = %err, "Remote call rejected"),
        }
        self.state().last_error = Some(error.clone());
        error
    }

    fn commit(&self, state: &mut State<R>) {
        state.cache_current = self.store.write_snapshot(&state.snapshot);
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn state(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<R, A> Refresh for Synchronizer<R, A>
where
    R: Resource,
    A: RemoteApi<R>,
{
    fn kind(&self) -> ResourceKind {
        R::KIND
    }

    fn is_loading(&self) -> bool {
        Synchronizer::is_loading(self)
    }

    async fn refresh(&self) {
        if let Err(e) = self.fetch_all(None).await {
            tracing::warn!(resource = %R::KIND, error = %e, "Background refresh failed");
        }
    }

    async fn reconnect(&self) {
        if let Err(e) = Synchronizer::reconnect(self).await {
            tracing::warn!(resource = %R::KIND, error = %e, "Reconciling fetch failed");
        }
    }
}

impl<R: Resource, A> fmt::Debug for Synchronizer<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("resource", &R::KIND)
            .finish_non_exhaustive()
    }
}
