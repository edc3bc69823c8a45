//! Pending operations: mutations waiting to be replayed against the remote.

use crate::{Patch, RecordId, ResourceKind, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Unique identifier for a pending operation.
pub type OperationId = String;

/// What a pending operation does to its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "UPPERCASE")]
pub enum Verb {
    Update { payload: Patch },
    Delete,
}

/// A mutation that could not reach the remote yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub op_id: OperationId,
    pub resource: ResourceKind,
    pub target_id: RecordId,
    #[serde(flatten)]
    pub verb: Verb,
    /// Milliseconds since epoch.
    pub enqueued_at: Timestamp,
}

impl PendingOperation {
    pub fn update(resource: ResourceKind, target_id: RecordId, payload: Patch) -> Self {
        Self::new(resource, target_id, Verb::Update { payload })
    }

    pub fn delete(resource: ResourceKind, target_id: RecordId) -> Self {
        Self::new(resource, target_id, Verb::Delete)
    }

    fn new(resource: ResourceKind, target_id: RecordId, verb: Verb) -> Self {
        Self {
            op_id: uuid::Uuid::new_v4().to_string(),
            resource,
            target_id,
            verb,
            enqueued_at: Utc::now().timestamp_millis(),
        }
    }
}
