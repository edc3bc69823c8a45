//! Notification-specific operations.

use crate::{
    error::Result, ClearScope, Mutation, Notification, Patch, RecordId, RemoteApi, Synchronizer,
};

impl<A: RemoteApi<Notification>> Synchronizer<Notification, A> {
    /// Unread notifications in the current snapshot. Computed on every call.
    pub fn unread_count(&self) -> usize {
        self.read(|snapshot| snapshot.records().iter().filter(|n| !n.is_read).count())
    }

    pub async fn mark_read(&self, id: RecordId) -> Result<Mutation<Notification>> {
        self.mutate(id, Patch::new().set("is_read", true)).await
    }

    pub async fn mark_unread(&self, id: RecordId) -> Result<Mutation<Notification>> {
        self.mutate(id, Patch::new().set("is_read", false)).await
    }

    /// Mark every unread notification as read, one update each.
    ///
    /// Stops at the first error that is not deferred into the queue.
    pub async fn mark_all_read(&self) -> Result<Vec<Mutation<Notification>>> {
        let unread: Vec<RecordId> = self.read(|snapshot| {
            snapshot
                .records()
                .iter()
                .filter(|n| !n.is_read)
                .map(|n| n.id)
                .collect()
        });

        let mut results = Vec::with_capacity(unread.len());
        for id in unread {
            results.push(self.mark_read(id).await?);
        }
        Ok(results)
    }

    /// Remove read notifications locally and on the server.
    pub async fn clear_read(&self) -> Result<Vec<Notification>> {
        self.bulk_clear(ClearScope::Read).await
    }

    /// Remove every notification. The snapshot is persisted empty.
    pub async fn clear_all(&self) -> Result<Vec<Notification>> {
        self.bulk_clear(ClearScope::All).await
    }
}
