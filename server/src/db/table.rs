//! A single in-memory table keyed by server-assigned id.

use dashmap::DashMap;
use sprout_engine::{Filters, RecordId, Resource};
use std::sync::atomic::{AtomicI64, Ordering};

/// Rows of one resource type.
#[derive(Debug)]
pub struct Table<R> {
    rows: DashMap<RecordId, R>,
    next_id: AtomicI64,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl<R: Resource> Table<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows matching the filters, ordered by id.
    pub fn list(&self, filters: &Filters) -> Vec<R> {
        let mut rows: Vec<R> = self
            .rows
            .iter()
            .filter(|row| filters.matches(row.value()))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|r| r.id());
        rows
    }

    pub fn get(&self, id: RecordId) -> Option<R> {
        self.rows.get(&id).map(|row| row.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row built around the next id.
    pub fn insert_with(&self, build: impl FnOnce(RecordId) -> R) -> R {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    /// Insert rows with their own ids, keeping the sequence ahead of them.
    pub fn seed(&self, rows: impl IntoIterator<Item = R>) {
        for row in rows {
            let id = row.id();
            self.next_id.fetch_max(id + 1, Ordering::SeqCst);
            self.rows.insert(id, row);
        }
    }

    /// Modify one row in place. `Ok(None)` if it does not exist; on error the
    /// row is left untouched.
    pub fn update<E>(
        &self,
        id: RecordId,
        modify: impl FnOnce(&mut R) -> Result<(), E>,
    ) -> Result<Option<R>, E> {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };
        let mut updated = row.value().clone();
        modify(&mut updated)?;
        *row = updated.clone();
        Ok(Some(updated))
    }

    pub fn remove(&self, id: RecordId) -> Option<R> {
        self.rows.remove(&id).map(|(_, row)| row)
    }

    /// Remove every row matching `predicate`. Returns how many were removed.
    pub fn remove_where(&self, predicate: impl Fn(&R) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, row| !predicate(row));
        before - self.rows.len()
    }
}
