//! The remote resource API, as seen by a synchronizer.

use crate::{Filters, Patch, RecordId, RemoteError, Resource};
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// CRUD endpoints for one resource collection.
///
/// Implementations must classify every failure into a [`RemoteError`] kind
/// and enforce their own timeouts.
#[async_trait]
pub trait RemoteApi<R: Resource>: Send + Sync {
    /// `GET /{resource}` or `GET /{resource}?filters`.
    async fn list(&self, filters: &Filters) -> RemoteResult<Vec<R>>;

    /// `PUT /{resource}/{id}`. Returns the server-confirmed record.
    async fn update(&self, id: RecordId, patch: &Patch) -> RemoteResult<R>;

    /// `DELETE /{resource}/{id}`.
    async fn delete(&self, id: RecordId) -> RemoteResult<()>;

    /// `POST /{resource}`. Returns the record with its server-assigned id.
    async fn create(&self, draft: &R::Draft) -> RemoteResult<R>;

    /// `DELETE /{resource}?readOnly=bool`.
    async fn bulk_delete(&self, read_only: bool) -> RemoteResult<()>;
}

#[async_trait]
impl<R, T> RemoteApi<R> for Arc<T>
where
    R: Resource,
    T: RemoteApi<R> + ?Sized,
{
    async fn list(&self, filters: &Filters) -> RemoteResult<Vec<R>> {
        (**self).list(filters).await
    }

    async fn update(&self, id: RecordId, patch: &Patch) -> RemoteResult<R> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: RecordId) -> RemoteResult<()> {
        (**self).delete(id).await
    }

    async fn create(&self, draft: &R::Draft) -> RemoteResult<R> {
        (**self).create(draft).await
    }

    async fn bulk_delete(&self, read_only: bool) -> RemoteResult<()> {
        (**self).bulk_delete(read_only).await
    }
}
