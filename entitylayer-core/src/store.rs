//! Main document store interface for interacting with document backends.
//!
//! [`DocumentStore`] owns a backend and hands out typed collections, the
//! sequence allocator and per-type [`EntityRepository`] instances that borrow it.
//!
//! # Example
//!
//! ```ignore
//! use entitylayer::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let customers = store.repository::<Customer>(config, registry);
//! let next = store.sequences().next("invoices", 1).await?;
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    collection::TypedCollection,
    config::EntityConfig,
    document::{Document, Entity},
    error::DocumentStoreResult,
    registry::FieldRegistry,
    repository::EntityRepository,
    sequence::SequenceAllocator,
};

/// A strongly-typed document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a typed collection for the specified document type.
    ///
    /// The collection name is determined by the document type's `collection_name()` method.
    pub fn typed_collection<D: Document>(&self) -> TypedCollection<'_, B, D> {
        TypedCollection::new(D::collection_name().to_string(), &self.backend)
    }

    /// Gets a typed collection stored under an explicit name.
    pub fn typed_collection_named<D: Document>(&self, name: &str) -> TypedCollection<'_, B, D> {
        TypedCollection::new(name.to_string(), &self.backend)
    }

    /// The allocator for named counters in this store.
    pub fn sequences(&self) -> SequenceAllocator<'_, B> {
        SequenceAllocator::new(&self.backend)
    }

    /// A repository for entity type `E` configured by `config`.
    ///
    /// The registry is shared so it can be built once per type and reused.
    pub fn repository<E: Entity>(
        &self,
        config: EntityConfig,
        registry: Arc<FieldRegistry<E>>,
    ) -> EntityRepository<'_, B, E> {
        EntityRepository::new(&self.backend, config, registry)
    }

    /// Creates a new collection with the given name.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .create_collection(name)
            .await
    }

    /// Drops (deletes) a collection with the given name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or deletion fails.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Adds an index to a field in a collection.
    pub async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
        sparse: bool,
    ) -> DocumentStoreResult<()> {
        self.backend
            .add_index(collection, field, unique, sparse)
            .await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
