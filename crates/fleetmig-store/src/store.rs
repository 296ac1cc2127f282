//! The document store interface

use crate::document::Document;
use crate::error::StoreError;
use crate::operation::Operation;
use crate::query::Query;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Forward cursor over documents of one collection
pub type DocumentCursor = BoxStream<'static, Result<Document, StoreError>>;

/// Collection-oriented document store
///
/// Implementations must apply [`DocumentStore::apply_transaction`]
/// all-or-nothing: when any precondition fails, no operation takes effect
/// and the failure is reported as [`StoreError::PreconditionFailed`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all collections, sorted
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Documents of `collection` matching `query`, in id order
    ///
    /// A missing collection yields an empty cursor.
    async fn find_all(&self, collection: &str, query: &Query) -> Result<DocumentCursor, StoreError>;

    /// A single document by id
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// Number of documents in `collection`
    async fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// Apply `ops` atomically
    async fn apply_transaction(&self, ops: &[Operation]) -> Result<(), StoreError>;

    /// Apply any transactions left pending by an earlier interrupted run
    async fn resume_pending_transactions(&self) -> Result<(), StoreError>;

    /// Remove a collection and all its documents; missing collections are fine
    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;
}
