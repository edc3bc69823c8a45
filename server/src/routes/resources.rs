//! Resource collection routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use sprout_engine::{Notification, Patch, Plant, RecordId};
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::db::Stored;
use crate::error::Result;
use crate::handlers::{
    handle_bulk_delete, handle_create, handle_delete, handle_list, handle_update,
    BulkDeleteQuery, BulkDeleteResponse,
};
use crate::AppState;

/// Create resource routes for plants and notifications.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(collection::<Plant>())
        .merge(collection::<Notification>())
}

fn collection<R: Stored>() -> Router<AppState> {
    let base = format!("/{}", R::KIND);
    Router::new()
        .route(
            &base,
            get(list_handler::<R>)
                .post(create_handler::<R>)
                .delete(bulk_delete_handler::<R>),
        )
        .route(
            &format!("{base}/{{id}}"),
            put(update_handler::<R>).delete(delete_handler::<R>),
        )
}

/// GET /{resource} - List rows, optionally filtered.
async fn list_handler<R: Stored>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<R>> {
    Json(handle_list::<R>(&state.db, params))
}

/// POST /{resource} - Create a row with a server-assigned id.
async fn create_handler<R: Stored>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(draft): Json<R::Draft>,
) -> (StatusCode, Json<R>) {
    (StatusCode::CREATED, Json(handle_create::<R>(&state.db, draft)))
}

/// PUT /{resource}/{id} - Apply a partial update.
async fn update_handler<R: Stored>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<RecordId>,
    Json(patch): Json<Patch>,
) -> Result<Json<R>> {
    Ok(Json(handle_update::<R>(&state.db, id, patch)?))
}

/// DELETE /{resource}/{id} - Delete one row.
async fn delete_handler<R: Stored>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<RecordId>,
) -> Result<StatusCode> {
    handle_delete::<R>(&state.db, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /{resource}?readOnly=bool - Bulk delete.
async fn bulk_delete_handler<R: Stored>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<BulkDeleteQuery>,
) -> Result<Json<BulkDeleteResponse>> {
    Ok(Json(handle_bulk_delete::<R>(&state.db, query)?))
}
