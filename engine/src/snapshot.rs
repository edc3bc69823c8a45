//! Collection snapshots and their durable cache form.
//!
//! A [`CollectionSnapshot`] is the in-memory "last known good state" of one
//! collection. A [`CacheEntry`] is what gets written to the local store so a
//! cold start can rehydrate before the first network round-trip.

use crate::{error::Result, Patch, RecordId, Resource, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the cache format. Entries with any other version are ignored.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Ordered records of one collection, unique by id.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot<R> {
    records: Vec<R>,
}

impl<R> Default for CollectionSnapshot<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R: Resource> CollectionSnapshot<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records. A later duplicate replaces the earlier one in place.
    pub fn from_records(records: impl IntoIterator<Item = R>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn into_records(self) -> Vec<R> {
        self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace by id.
    pub fn upsert(&mut self, record: R) {
        match self.records.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn remove(&mut self, id: RecordId) -> Option<R> {
        let index = self.records.iter().position(|r| r.id() == id)?;
        Some(self.records.remove(index))
    }

    /// Keep records matching the predicate, returning the removed ones.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<R>
    where
        F: FnMut(&R) -> bool,
    {
        let (kept, removed) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| keep(r));
        self.records = kept;
        removed
    }

    /// Apply a patch to one record. Returns `Ok(None)` if the id is unknown.
    pub fn patch(&mut self, id: RecordId, patch: &Patch) -> Result<Option<&R>> {
        let Some(record) = self.records.iter_mut().find(|r| r.id() == id) else {
            return Ok(None);
        };
        record.apply_patch(patch)?;
        Ok(Some(record))
    }

    /// Serialize into the durable cache form.
    pub fn to_cache_entry(&self) -> CacheEntry<R> {
        CacheEntry {
            format_version: SNAPSHOT_FORMAT_VERSION,
            resource: R::KIND,
            saved_at: Utc::now(),
            records: self.records.clone(),
        }
    }
}

/// Durable, serialized form of a collection snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<R> {
    pub format_version: u32,
    pub resource: ResourceKind,
    pub saved_at: DateTime<Utc>,
    pub records: Vec<R>,
}

impl<R: Resource> CacheEntry<R> {
    /// Parse a stored entry. Anything that is not a current-format entry for
    /// this resource is treated as absent.
    pub fn decode(raw: &str) -> Option<Self> {
        let entry: Self = match serde_json::from_str(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(resource = %R::KIND, error = %e, "Discarding unreadable cache entry");
                return None;
            }
        };
        if entry.format_version != SNAPSHOT_FORMAT_VERSION || entry.resource != R::KIND {
            tracing::warn!(
                resource = %R::KIND,
                format_version = entry.format_version,
                stored_resource = %entry.resource,
                "Discarding incompatible cache entry"
            );
            return None;
        }
        Some(entry)
    }

    pub fn into_snapshot(self) -> CollectionSnapshot<R> {
        CollectionSnapshot::from_records(self.records)
    }
}
