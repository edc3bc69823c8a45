//! Resource handlers - CRUD over the in-memory tables.

use crate::db::{Database, Stored};
use crate::error::{AppError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sprout_engine::{Filters, Patch, RecordId};
use std::collections::HashMap;

/// Query string of a bulk delete.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteQuery {
    /// Delete only read rows instead of all of them
    #[serde(default)]
    pub read_only: bool,
}

/// Response for a bulk delete.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResponse {
    pub deleted: usize,
}

/// List rows, filtered by field equality on every query parameter.
pub fn handle_list<R: Stored>(db: &Database, params: HashMap<String, String>) -> Vec<R> {
    let filters: Filters = params.into_iter().collect();
    R::table(db).list(&filters)
}

pub fn handle_create<R: Stored>(db: &Database, draft: R::Draft) -> R {
    let now = Utc::now();
    let row = R::table(db).insert_with(|id| {
        let mut row = R::from_draft(id, draft, now);
        row.normalize();
        row
    });
    tracing::debug!(resource = %R::KIND, id = row.id(), "Created");
    row
}

pub fn handle_update<R: Stored>(db: &Database, id: RecordId, patch: Patch) -> Result<R> {
    let updated = R::table(db).update(id, |row| {
        row.apply_patch(&patch)?;
        row.normalize();
        Ok::<_, AppError>(())
    })?;
    updated.ok_or_else(|| AppError::NotFound(format!("{} {}", R::KIND, id)))
}

pub fn handle_delete<R: Stored>(db: &Database, id: RecordId) -> Result<()> {
    R::table(db)
        .remove(id)
        .map(drop)
        .ok_or_else(|| AppError::NotFound(format!("{} {}", R::KIND, id)))
}

/// Delete all rows, or only read rows when `readOnly=true`.
pub fn handle_bulk_delete<R: Stored>(
    db: &Database,
    query: BulkDeleteQuery,
) -> Result<BulkDeleteResponse> {
    if query.read_only && !R::TRACKS_READ_STATE {
        return Err(AppError::BadRequest(format!(
            "readOnly is not supported for {}",
            R::KIND
        )));
    }

    let table = R::table(db);
    let deleted = if query.read_only {
        table.remove_where(|row| row.is_read())
    } else {
        table.remove_where(|_| true)
    };
    tracing::info!(resource = %R::KIND, deleted, read_only = query.read_only, "Bulk delete");
    Ok(BulkDeleteResponse { deleted })
}
