//! Storage backend abstraction for the document store.
//!
//! This module defines the core traits that abstract over different storage implementations,
//! allowing the document store to work with various backends (in-memory, MongoDB, etc.).
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for all storage operations
//! including document insertion, retrieval, deletion, querying, predicate-wide field
//! updates, named counters and collection management. Implementations are required to be
//! thread-safe (`Send + Sync`) and support concurrent access.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use entitylayer::backend::StoreBackend;
//! use bson::{Uuid, Bson, doc};
//!
//! let backend = MyBackendImpl::new();
//!
//! let uuid = Uuid::new();
//! let doc = Bson::Document(doc! { "name": "Alice", "age": 30 });
//! backend.insert_documents(vec![(uuid, doc)], "users").await?;
//!
//! let next = backend.find_and_increment("users", 1).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument, Uuid};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Expr, Query},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Every method is individually atomic with respect to the documents it
/// touches; no method holds a lock across calls.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Driver failures surface as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// The collection is created on first use. Inserting an id that is already
    /// present fails with [`DocumentStoreError::AlreadyExists`](crate::error::DocumentStoreError::AlreadyExists).
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces existing documents by id.
    ///
    /// Fails with [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound)
    /// if any id is absent.
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Deletes documents from a collection by their IDs.
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()>;

    /// Retrieves documents from a collection by their IDs.
    ///
    /// Documents are returned in store order. Missing ids are omitted.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Queries documents in a collection using a structured query.
    ///
    /// Applies the filter, then the ordered sort directives, then offset and limit.
    ///
    /// # See Also
    ///
    /// - [`Query`] for constructing queries
    /// - [`crate::query::Filter`] for building filter expressions
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Counts the documents matching `filter`, or every document when `None`.
    ///
    /// A missing collection counts as empty.
    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Sets the given top-level fields on every document matching `filter`.
    ///
    /// Returns the number of matched documents. Each document is updated atomically;
    /// the set of matches as a whole is not.
    async fn update_fields(
        &self,
        filter: Expr,
        fields: BsonDocument,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Removes every document matching `filter` and returns how many were removed.
    async fn remove_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64>;

    /// Atomically adds `delta` to the named counter and returns the new value.
    ///
    /// A counter that does not exist yet starts from 0. No two concurrent callers may
    /// observe overlapping ranges.
    async fn find_and_increment(&self, counter: &str, delta: i64) -> DocumentStoreResult<i64>;

    /// Creates a new, empty collection.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops (deletes) a collection and all its documents.
    ///
    /// # Warning
    ///
    /// This operation is irreversible.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Creates an index on a field in a collection.
    ///
    /// A `sparse` index skips documents that lack the field, so a unique sparse
    /// index allows any number of documents without a value.
    async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
        sparse: bool,
    ) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
