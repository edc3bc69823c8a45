//! Pending operation queue.
//!
//! FIFO per collection, mirrored into the local store's pending log. The
//! in-memory copy is authoritative for the session, so a failing store only
//! costs durability across restarts.

use crate::{LocalStore, OperationId, PendingOperation, RemoteError, ResourceKind};
use std::collections::VecDeque;

/// Ordered buffer of mutations awaiting replay.
#[derive(Debug)]
pub struct PendingQueue {
    kind: ResourceKind,
    ops: VecDeque<PendingOperation>,
    store: LocalStore,
}

impl PendingQueue {
    /// Rehydrate from the store's pending log.
    pub fn load(store: LocalStore, kind: ResourceKind) -> Self {
        let ops: VecDeque<_> = store.list_pending_ops(kind).into();
        if !ops.is_empty() {
            tracing::info!(resource = %kind, pending = ops.len(), "Restored pending operations");
        }
        Self { kind, ops, store }
    }

    pub fn enqueue(&mut self, op: PendingOperation) {
        debug_assert_eq!(op.resource, self.kind);
        tracing::debug!(
            resource = %self.kind,
            op_id = %op.op_id,
            target_id = op.target_id,
            "Queued operation"
        );
        self.store.append_pending_op(&op);
        self.ops.push_back(op);
    }

    /// The oldest operation.
    pub fn front(&self) -> Option<&PendingOperation> {
        self.ops.front()
    }

    /// Remove an operation after its remote call succeeded, was dropped, or
    /// was abandoned by the caller.
    pub fn acknowledge(&mut self, op_id: &OperationId) -> Option<PendingOperation> {
        let index = self.ops.iter().position(|op| &op.op_id == op_id)?;
        let op = self.ops.remove(index)?;
        self.store.remove_pending_op(self.kind, op_id);
        Some(op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.ops.iter()
    }
}

/// What to do after a replayed operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// Drop the operation and continue with the rest.
    Drop,
    /// Stop draining; the operation and everything after it stay queued.
    Halt,
}

impl DrainStep {
    pub fn after(err: &RemoteError) -> Self {
        match err.kind {
            crate::ErrorKind::TerminalRequest => DrainStep::Drop,
            crate::ErrorKind::RetryableNetwork
            | crate::ErrorKind::AuthExpired
            | crate::ErrorKind::Offline => DrainStep::Halt,
        }
    }
}

/// An operation discarded during a drain.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedOperation {
    pub op: PendingOperation,
    pub error: RemoteError,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub replayed: usize,
    pub dropped: Vec<DroppedOperation>,
    /// Why draining stopped early, if it did.
    pub halted: Option<RemoteError>,
    /// Operations still queued afterwards.
    pub remaining: usize,
}

impl DrainReport {
    /// Nothing is left in the queue.
    pub fn is_clear(&self) -> bool {
        self.remaining == 0
    }
}
