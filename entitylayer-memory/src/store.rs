//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that stores documents as
//! BSON values behind async-safe read-write locks. Named counters live behind
//! their own mutex so that increments are serialized independently of
//! document traffic.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use async_trait::async_trait;
use mea::{mutex::Mutex, rwlock::RwLock};
use bson::{Bson, Document as BsonDocument, Uuid};
use tracing::debug;

use entitylayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::evaluator::{DocumentEvaluator, compare_documents};

/// Documents of one collection, iterated in insertion order.
#[derive(Debug, Default)]
struct CollectionMap {
    next_position: u64,
    positions: HashMap<Uuid, u64>,
    documents: BTreeMap<u64, (Uuid, Bson)>,
}

impl CollectionMap {
    fn contains(&self, id: &Uuid) -> bool {
        self.positions.contains_key(id)
    }

    fn get(&self, id: &Uuid) -> Option<&Bson> {
        self.positions
            .get(id)
            .and_then(|position| self.documents.get(position))
            .map(|(_, doc)| doc)
    }

    fn insert(&mut self, id: Uuid, doc: Bson) {
        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(id, position);
        self.documents.insert(position, (id, doc));
    }

    fn replace(&mut self, id: &Uuid, doc: Bson) -> bool {
        match self.positions.get(id).and_then(|position| self.documents.get_mut(position)) {
            Some(entry) => {
                entry.1 = doc;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: &Uuid) -> Option<Bson> {
        let position = self.positions.remove(id)?;
        self.documents.remove(&position).map(|(_, doc)| doc)
    }

    fn values(&self) -> impl Iterator<Item = &Bson> {
        self.documents.values().map(|(_, doc)| doc)
    }

    fn matching_ids(&self, filter: &Expr) -> DocumentStoreResult<Vec<Uuid>> {
        let mut ids = Vec::new();
        for (id, doc) in self.documents.values() {
            if DocumentEvaluator::matches(doc, filter)? {
                ids.push(*id);
            }
        }

        Ok(ids)
    }
}

type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// All documents are stored as BSON values indexed by their UUID. Unsorted
/// queries return documents in insertion order.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For larger datasets,
/// consider using a persistent backend like MongoDB.
///
/// # Example
///
/// ```ignore
/// use entitylayer_memory::InMemoryStore;
/// use entitylayer::backend::StoreBackend;
/// use bson::{Uuid, Bson, doc};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let id = Uuid::new();
///     let doc = Bson::Document(doc! { "name": "Alice", "age": 30 });
///     store.insert_documents(vec![(id, doc)], "users").await?;
///
///     assert_eq!(store.find_and_increment("users", 1).await?, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents
    store: Arc<RwLock<StoreMap>>,
    /// Named counters. Every increment takes this lock.
    counters: Arc<Mutex<HashMap<String, i64>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// use entitylayer_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Current value of a counter without incrementing it.
    pub async fn counter_value(&self, counter: &str) -> Option<i64> {
        self.counters.lock().await.get(counter).copied()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        if let Some((id, _)) = documents.iter().find(|(id, _)| collection_map.contains(id)) {
            return Err(DocumentStoreError::AlreadyExists(id.to_string(), collection.to_string()));
        }

        for (id, doc) in documents {
            collection_map.insert(id, doc);
        }

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(DocumentStoreError::CollectionNotFound(collection.to_string())),
        };

        if let Some((id, _)) = documents.iter().find(|(id, _)| !collection_map.contains(id)) {
            return Err(DocumentStoreError::NotFound(id.to_string(), collection.to_string()));
        }

        for (id, doc) in documents {
            collection_map.replace(&id, doc);
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(DocumentStoreError::CollectionNotFound(collection.to_string())),
        };

        for id in ids {
            if collection_map.remove(&id).is_none() {
                return Err(DocumentStoreError::NotFound(id.to_string(), collection.to_string()));
            }
        }

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        Ok(ids
            .iter()
            .filter_map(|id| collection_map.get(id).cloned())
            .collect())
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut documents = match &query.filter {
            Some(filter) => DocumentEvaluator::filter_documents(collection_map.values(), filter)?,
            None => collection_map
                .values()
                .cloned()
                .collect::<Vec<_>>(),
        };

        // Stable, so ties keep insertion order.
        if !query.sort.is_empty() {
            documents.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        Ok(documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(0);
        };

        let count = match filter {
            Some(filter) => collection_map.matching_ids(&filter)?.len(),
            None => collection_map.positions.len(),
        };

        Ok(count as u64)
    }

    async fn update_fields(&self, filter: Expr, fields: BsonDocument, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let ids = collection_map.matching_ids(&filter)?;
        for id in &ids {
            if let Some(doc) = collection_map
                .positions
                .get(id)
                .and_then(|position| collection_map.documents.get_mut(position))
                .and_then(|(_, doc)| doc.as_document_mut())
            {
                for (key, value) in &fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
        }

        debug!(target: "entitylayer::memory", collection, matched = ids.len(), "updated fields");

        Ok(ids.len() as u64)
    }

    async fn remove_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let ids = collection_map.matching_ids(&filter)?;
        for id in &ids {
            collection_map.remove(id);
        }

        Ok(ids.len() as u64)
    }

    async fn find_and_increment(&self, counter: &str, delta: i64) -> DocumentStoreResult<i64> {
        let mut counters = self.counters.lock().await;
        let value = counters.entry(counter.to_string()).or_insert(0);
        *value = value.checked_add(delta).ok_or_else(|| {
            DocumentStoreError::validation(format!("counter '{counter}' overflows when advanced by {delta}"))
        })?;

        Ok(*value)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names: Vec<String> = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, _unique: bool, _sparse: bool) -> DocumentStoreResult<()> {
        // No indexing in memory.
        debug!(target: "entitylayer::memory", collection, field, "ignoring index request");

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use entitylayer_memory::InMemoryStore;
/// use entitylayer::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
