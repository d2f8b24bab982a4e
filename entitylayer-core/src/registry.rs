//! Name-addressed property access for entity types.
//!
//! Patch operations name the properties they touch as strings. A
//! [`FieldRegistry`] maps each allowed name to a typed accessor pair, built once
//! per entity type:
//!
//! ```ignore
//! let registry = FieldRegistry::<Customer>::builder()
//!     .field("name", |c| &c.name, |c| &mut c.name)
//!     .field("balance", |c| &c.balance, |c| &mut c.balance)
//!     .build();
//! ```
//!
//! Names are the serialized (BSON) field names, so they line up with the keys
//! the diff engine compares and the keys written by a partial update.

use bson::{Bson, Document as BsonDocument, ser::serialize_to_bson};
use serde::Serialize;
use std::fmt;

use crate::{
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
};

type Reader<E> = Box<dyn Fn(&E) -> DocumentStoreResult<Bson> + Send + Sync>;
type Copier<E> = Box<dyn Fn(&E, &mut E) + Send + Sync>;

struct Accessor<E> {
    name: String,
    read: Reader<E>,
    copy: Copier<E>,
}

pub struct FieldRegistry<E> {
    fields: Vec<Accessor<E>>,
}

impl<E> fmt::Debug for FieldRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("fields", &self.fields.iter().map(|a| a.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl<E: Document> FieldRegistry<E> {
    pub fn builder() -> FieldRegistryBuilder<E> {
        FieldRegistryBuilder { fields: Vec::new() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|a| a.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|a| a.name.as_str())
    }

    /// Checks that `names` is non-empty and every entry is registered.
    pub fn validate(&self, names: &[String]) -> DocumentStoreResult<()> {
        if names.is_empty() {
            return Err(DocumentStoreError::validation(format!(
                "no properties named for {}",
                E::collection_name()
            )));
        }

        names.iter().try_for_each(|name| self.accessor(name).map(|_| ()))
    }

    /// Reads one property as BSON.
    pub fn read(&self, entity: &E, name: &str) -> DocumentStoreResult<Bson> {
        (self.accessor(name)?.read)(entity)
    }

    /// Copies one property from `from` into `to`.
    pub fn copy(&self, name: &str, from: &E, to: &mut E) -> DocumentStoreResult<()> {
        (self.accessor(name)?.copy)(from, to);
        Ok(())
    }

    /// Reads several properties into a document keyed by property name.
    pub fn read_all(&self, entity: &E, names: &[String]) -> DocumentStoreResult<BsonDocument> {
        let mut document = BsonDocument::new();
        for name in names {
            document.insert(name.clone(), self.read(entity, name)?);
        }

        Ok(document)
    }

    fn accessor(&self, name: &str) -> DocumentStoreResult<&Accessor<E>> {
        self.fields
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| {
                DocumentStoreError::validation(format!(
                    "unsupported property '{name}' for {}",
                    E::collection_name()
                ))
            })
    }
}

pub struct FieldRegistryBuilder<E> {
    fields: Vec<Accessor<E>>,
}

impl<E: Document> FieldRegistryBuilder<E> {
    /// Registers a property. A later registration under the same name replaces the earlier one.
    pub fn field<T>(mut self, name: impl Into<String>, get: fn(&E) -> &T, get_mut: fn(&mut E) -> &mut T) -> Self
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        let name = name.into();
        self.fields.retain(|a| a.name != name);
        self.fields.push(Accessor {
            name,
            read: Box::new(move |entity| Ok(serialize_to_bson(get(entity))?)),
            copy: Box::new(move |from, to| *get_mut(to) = get(from).clone()),
        });
        self
    }

    pub fn build(self) -> FieldRegistry<E> {
        FieldRegistry { fields: self.fields }
    }
}
