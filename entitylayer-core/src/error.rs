//! Error types and result types for document store operations.
//!
//! This module provides the error taxonomy shared by every layer of the crate.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! The four caller-facing kinds are [`DocumentStoreError::NotFound`],
//! [`DocumentStoreError::AlreadyExists`], [`DocumentStoreError::Validation`] and
//! [`DocumentStoreError::Conversion`]. The remaining variants describe failures
//! of the serialization layer or the storage backend itself.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// An identifier, slug or predicate matched nothing on an operation requiring a match.
    /// The first argument describes the lookup key, the second is the collection name.
    #[error("Document {0} not found in collection {1}")]
    NotFound(String, String),
    /// A uniqueness violation that could not be resolved by removing a stale record.
    /// The first argument describes the colliding key, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    AlreadyExists(String, String),
    /// Malformed paging parameters, a bad filter operand or an unsupported property name.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A stored value could not be rendered to its display form.
    #[error("Conversion error: {0}")]
    Conversion(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Shorthand for a [`DocumentStoreError::Validation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        DocumentStoreError::Validation(message.into())
    }

    /// Returns `true` for [`DocumentStoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound(..))
    }

    /// Returns `true` for [`DocumentStoreError::AlreadyExists`].
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DocumentStoreError::AlreadyExists(..))
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
