//! Core traits and types for document representation and serialization.
//!
//! This module provides the traits that all stored documents must implement,
//! as well as utilities for converting documents to and from BSON.
//!
//! [`Document`] is the storage-level contract (identity and collection), and
//! [`Entity`] layers the lifecycle rules on top of it: human-readable slugs,
//! the soft-delete flag, authorship stamps, duplicate detection and validation.

use bson::{Bson, Document as BsonDocument, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};

use crate::{
    audit::AuditContext,
    error::{DocumentStoreError, DocumentStoreResult},
    query::Expr,
};

/// Core trait that all documents stored in a document store must implement.
///
/// Every document belongs to exactly one collection and carries an opaque
/// identifier once it has been stored. Documents that have not been persisted
/// yet return `None` from [`Document::id`]; the store assigns the identifier on
/// first write.
///
/// # Example
///
/// ```ignore
/// use entitylayer::document::Document;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     pub id: Option<Uuid>,
///     pub name: String,
/// }
///
/// impl Document for User {
///     fn id(&self) -> Option<Uuid> { self.id }
///     fn set_id(&mut self, id: Uuid) { self.id = Some(id); }
///     fn collection_name() -> &'static str { "users" }
/// }
/// ```
pub trait Document: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns this document's identifier, if it has been assigned one.
    fn id(&self) -> Option<Uuid>;

    /// Assigns the store identifier.
    fn set_id(&mut self, id: Uuid);

    /// Returns the name of the collection this document belongs to.
    ///
    /// This should be a static, lowercase identifier (e.g., "users", "products").
    fn collection_name() -> &'static str;
}

/// Extension trait providing serialization/deserialization utilities for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a BSON value for storage.
    fn to_bson(&self) -> DocumentStoreResult<Bson>;

    /// Converts this document to a BSON document (map) for field-level access.
    fn to_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a document from a BSON value.
    fn from_bson(bson: Bson) -> DocumentStoreResult<Self>;

    /// Returns the identifier or a validation error naming the operation.
    fn require_id(&self, operation: &str) -> DocumentStoreResult<Uuid>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson(&self) -> DocumentStoreResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn to_document(&self) -> DocumentStoreResult<BsonDocument> {
        match self.to_bson()? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::Serialization(format!(
                "{} serialized to {:?}, expected a document",
                Self::collection_name(),
                other.element_type(),
            ))),
        }
    }

    fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn require_id(&self, operation: &str) -> DocumentStoreResult<Uuid> {
        self.id().ok_or_else(|| {
            DocumentStoreError::validation(format!(
                "{operation} requires a document with an identifier in {}",
                Self::collection_name()
            ))
        })
    }
}

/// Lifecycle contract for documents managed by an
/// [`EntityRepository`](crate::repository::EntityRepository).
///
/// Slugs are assigned at most once. Implementations of [`Entity::assign_slug`]
/// should store both values on the instance; the repository never calls it for
/// an entity that already has a slug.
pub trait Entity: Document {
    /// The human-readable identifier, if one has been assigned.
    fn slug(&self) -> Option<&str>;

    /// Stores a freshly allocated slug together with the sequence number it was derived from.
    fn assign_slug(&mut self, slug: String, sequence: i64);

    /// Soft-deleted entities return `false`. They stay addressable by id but
    /// are excluded from active queries and produce no audit records.
    fn is_active(&self) -> bool {
        true
    }

    /// Records authorship before a write. `created` is `true` on the first write.
    fn stamp(&mut self, _context: &AuditContext, _created: bool) {}

    /// Predicate matching records that collide with this one on its uniqueness key.
    ///
    /// Returning `None` disables duplicate detection for the type.
    fn duplicate_filter(&self) -> Option<Expr> {
        None
    }

    /// Checks invariants before any write. Failures surface as validation errors.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
