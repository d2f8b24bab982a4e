use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, Uuid, doc};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, FindOptions, IndexOptions, ReturnDocument},
};
use tracing::{debug, info};

use entitylayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::{query::MongoQueryTranslator, sanitizer::ValueSanitizer};

/// Collection holding one `{ _id: <name>, seq: <i64> }` document per counter.
const COUNTERS_COLLECTION: &str = "_counters";

fn backend_error(e: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(e.to_string())
}

/// MongoDB-backed [`StoreBackend`].
///
/// Entity ids are stored as the `_id` of each document in addition to the
/// entity's own id field, so lookups by id hit the primary key index.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&ValueSanitizer::sanitize_key(collection_name))
    }

    fn prepare_document(&self, id: &Uuid, document: &Bson) -> DocumentStoreResult<Document> {
        let mut prepared = document
            .as_document()
            .map(ValueSanitizer::sanitize_document)
            .ok_or_else(|| DocumentStoreError::Serialization("Expected document".into()))?;
        prepared.insert("_id", *id);

        Ok(prepared)
    }

    fn restore_document(&self, mut document: Document) -> Bson {
        document.remove("_id");

        Bson::Document(ValueSanitizer::restore_document(&document))
    }

    fn filter_document(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator::translate(expr),
            None => Ok(doc! {}),
        }
    }

    async fn find(&self, filter: Document, options: FindOptions, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        Ok(
            self.get_collection(collection)
                .find(filter)
                .with_options(options)
                .await
                .map_err(backend_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(backend_error)?
                .into_iter()
                .map(|doc| self.restore_document(doc))
                .collect()
        )
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = documents.iter().map(|(id, _)| *id).collect();
        if let Some(existing) = self.get_collection(collection)
            .find_one(doc! { "_id": { "$in": ids } })
            .await
            .map_err(backend_error)?
            && let Some(id) = existing.get("_id")
        {
            return Err(DocumentStoreError::AlreadyExists(id.to_string(), collection.to_string()));
        }

        self.get_collection(collection)
            .insert_many(
                documents
                    .iter()
                    .map(|(id, doc)| self.prepare_document(id, doc))
                    .collect::<DocumentStoreResult<Vec<Document>>>()?,
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let target = self.get_collection(collection);

        for (id, doc) in documents {
            let result = target
                .replace_one(doc! { "_id": id }, self.prepare_document(&id, &doc)?)
                .await
                .map_err(backend_error)?;

            if result.matched_count == 0 {
                return Err(DocumentStoreError::NotFound(id.to_string(), collection.to_string()));
            }
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        let expected = ids.len() as u64;
        let result = self.get_collection(collection)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(backend_error)?;

        if result.deleted_count < expected {
            return Err(DocumentStoreError::NotFound(
                format!("{} of {expected} ids", expected - result.deleted_count),
                collection.to_string(),
            ));
        }

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.find(doc! { "_id": { "$in": ids } }, FindOptions::default(), collection).await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if !query.sort.is_empty() {
            options.sort = Some(MongoQueryTranslator::sort_document(&query.sort));
        }

        self.find(Self::filter_document(query.filter.as_ref())?, options, collection).await
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(Self::filter_document(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn update_fields(&self, filter: Expr, fields: Document, collection: &str) -> DocumentStoreResult<u64> {
        let fields = ValueSanitizer::sanitize_document(&fields);
        let result = self.get_collection(collection)
            .update_many(MongoQueryTranslator::translate(&filter)?, doc! { "$set": fields })
            .await
            .map_err(backend_error)?;

        debug!(target: "entitylayer::mongodb", collection, matched = result.matched_count, "updated fields");

        Ok(result.matched_count)
    }

    async fn remove_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(MongoQueryTranslator::translate(&filter)?)
                .await
                .map_err(backend_error)?
                .deleted_count
        )
    }

    async fn find_and_increment(&self, counter: &str, delta: i64) -> DocumentStoreResult<i64> {
        let updated = self.get_collection(COUNTERS_COLLECTION)
            .find_one_and_update(
                doc! { "_id": counter },
                doc! { "$inc": { "seq": delta } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend_error)?
            .ok_or_else(|| DocumentStoreError::Backend(format!("counter {counter} was not returned")))?;

        match updated.get("seq") {
            Some(Bson::Int64(value)) => Ok(*value),
            Some(Bson::Int32(value)) => Ok(i64::from(*value)),
            other => Err(DocumentStoreError::Backend(format!(
                "counter {counter} holds a non-integer value: {other:?}"
            ))),
        }
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .create_collection(ValueSanitizer::sanitize_key(name))
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names: Vec<String> = self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?
            .into_iter()
            .filter(|name| name != COUNTERS_COLLECTION)
            .map(|name| ValueSanitizer::restore_key(&name))
            .collect();
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool, sparse: bool) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(
                    IndexOptions::builder()
                    .unique(unique)
                    .sparse(sparse)
                    .build()
                )
                .build()
            )
            .await
            .map_err(backend_error)?;

        debug!(target: "entitylayer::mongodb", collection, field, unique, sparse, "ensured index");

        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        info!(target: "entitylayer::mongodb", database = %self.database, "client shut down");

        Ok(())
    }
}

/// Builder connecting a [`MongoDbStore`] from a connection string.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
