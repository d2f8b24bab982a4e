//! Typed collection handle for document store operations.
//!
//! A [`TypedCollection`] binds a backend reference to one collection name and one
//! document type, converting between the type and BSON on every call. It is also
//! the paged query executor: [`TypedCollection::find_page`] counts the matches and
//! then fetches one ordered window of them.
//!
//! # Example
//!
//! ```ignore
//! use entitylayer::document::Document;
//! use serde::{Serialize, Deserialize};
//! use bson::Uuid;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: Option<Uuid>,
//!     pub name: String,
//! }
//!
//! impl Document for User {
//!     fn id(&self) -> Option<Uuid> { self.id }
//!     fn set_id(&mut self, id: Uuid) { self.id = Some(id); }
//!     fn collection_name() -> &'static str { "users" }
//! }
//!
//! # async fn example(store: &entitylayer::store::DocumentStore<impl entitylayer::backend::StoreBackend>) -> entitylayer::error::DocumentStoreResult<()> {
//! let users = store.typed_collection::<User>();
//! let user = User { id: Some(Uuid::new()), name: "Alice".to_string() };
//! users.insert(vec![user]).await?;
//! # Ok(()) }
//! ```

use bson::{Bson, Document as BsonDocument, Uuid};
use std::marker::PhantomData;
use tracing::debug;

use crate::{
    backend::StoreBackend,
    document::{Document, DocumentExt},
    error::DocumentStoreResult,
    page::{Page, PageRequest},
    query::{Expr, Query, Sort},
};

#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, D: Document> {
    name: String,
    backend: &'a B,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend, D: Document> TypedCollection<'a, B, D> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend, _marker: PhantomData }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Converts this typed collection to a different document type.
    ///
    /// This method allows switching between different document types for the same collection.
    pub fn with_type<T: Document>(&self) -> TypedCollection<'a, B, T> {
        TypedCollection {
            name: self.name.clone(),
            backend: self.backend,
            _marker: PhantomData,
        }
    }

    /// Inserts new documents into the collection.
    ///
    /// # Errors
    ///
    /// Every document must already carry an identifier. Serialization failures and id
    /// clashes are returned as [`DocumentStoreError`](crate::error::DocumentStoreError).
    pub async fn insert(&self, documents: Vec<D>) -> DocumentStoreResult<()> {
        self.backend
            .insert_documents(Self::with_ids(documents, "insert")?, self.name())
            .await
    }

    /// Replaces existing documents in the collection.
    pub async fn update(&self, documents: Vec<D>) -> DocumentStoreResult<()> {
        self.backend
            .update_documents(Self::with_ids(documents, "update")?, self.name())
            .await
    }

    /// Deletes documents from the collection by their IDs.
    pub async fn delete<U>(&self, ids: Vec<U>) -> DocumentStoreResult<()>
    where
        U: Into<Uuid> + Send + Sync + 'static,
    {
        self.backend
            .delete_documents(
                ids.into_iter()
                    .map(Into::into)
                    .collect(),
                self.name(),
            )
            .await
    }

    /// Retrieves documents from the collection by their IDs.
    ///
    /// If a document ID doesn't exist, it is omitted from results.
    pub async fn get<U>(&self, ids: Vec<U>) -> DocumentStoreResult<Vec<D>>
    where
        U: Into<Uuid> + Send + Sync + 'static,
    {
        self.backend
            .get_documents(
                ids.into_iter()
                    .map(Into::into)
                    .collect(),
                self.name(),
            )
            .await?
            .into_iter()
            .map(D::from_bson)
            .collect()
    }

    /// Retrieves a single document by id.
    pub async fn get_one(&self, id: Uuid) -> DocumentStoreResult<Option<D>> {
        Ok(self.get(vec![id]).await?.into_iter().next())
    }

    /// Queries documents in the collection using a structured query.
    pub async fn query(&self, query: Query) -> DocumentStoreResult<Vec<D>> {
        self.backend
            .query_documents(query, self.name())
            .await?
            .into_iter()
            .map(D::from_bson)
            .collect()
    }

    /// Returns the first document matching `filter`, if any.
    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<D>> {
        let query = Query::builder()
            .filter(filter)
            .limit(1)
            .build();

        Ok(self.query(query).await?.into_iter().next())
    }

    /// Counts documents matching `filter`.
    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(filter, self.name())
            .await
    }

    /// Sets `fields` on every document matching `filter`, returning the matched count.
    pub async fn update_fields(&self, filter: Expr, fields: BsonDocument) -> DocumentStoreResult<u64> {
        self.backend
            .update_fields(filter, fields, self.name())
            .await
    }

    /// Removes every document matching `filter`, returning the removed count.
    pub async fn remove(&self, filter: Expr) -> DocumentStoreResult<u64> {
        self.backend
            .remove_documents(filter, self.name())
            .await
    }

    /// Fetches one page of the documents matching `filter` in `sort` order.
    ///
    /// The total is counted first and the window fetched afterwards, so under
    /// concurrent writes the two may reflect slightly different states.
    pub async fn find_page(
        &self,
        filter: Expr,
        sort: Vec<Sort>,
        request: PageRequest,
    ) -> DocumentStoreResult<Page<D>> {
        request.validate()?;

        let total = self.count(Some(filter.clone())).await?;
        let query = Query::builder()
            .filter(filter)
            .sorts(sort)
            .offset(request.offset())
            .limit(request.size)
            .build();

        debug!(
            target: "entitylayer::query",
            collection = %self.name,
            filter = ?query.filter,
            sort = ?query.sort,
            page = request.page,
            size = request.size,
            total,
            "executing paged query"
        );

        let items = self.query(query).await?;

        Ok(Page::builder(items)
            .with_request(request)
            .with_total_elements(total)
            .build())
    }

    fn with_ids(documents: Vec<D>, operation: &str) -> DocumentStoreResult<Vec<(Uuid, Bson)>> {
        documents
            .into_iter()
            .map(|d| Ok((d.require_id(operation)?, d.to_bson()?)))
            .collect()
    }
}
