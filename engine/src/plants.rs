//! Plant-specific operations.

use crate::{error::Result, Mutation, Patch, Plant, RecordId, RemoteApi, Synchronizer};
use chrono::{DateTime, Utc};

impl<A: RemoteApi<Plant>> Synchronizer<Plant, A> {
    /// Record a watering. The server recomputes `next_watering_due` from it,
    /// so the optimistic record keeps the old due date until confirmed.
    pub async fn record_watering(&self, id: RecordId, at: DateTime<Utc>) -> Result<Mutation<Plant>> {
        let patch = Patch::new().set("last_watered_at", serde_json::to_value(at)?);
        self.mutate(id, patch).await
    }

    pub async fn rename(&self, id: RecordId, name: impl Into<String>) -> Result<Mutation<Plant>> {
        self.mutate(id, Patch::new().set("name", name.into())).await
    }

    /// Plants whose server-computed due date is at or before `now`.
    pub fn due_for_watering(&self, now: DateTime<Utc>) -> Vec<Plant> {
        self.read(|snapshot| {
            snapshot
                .records()
                .iter()
                .filter(|p| p.next_watering_due.is_some_and(|due| due <= now))
                .cloned()
                .collect()
        })
    }
}
