//! Field-level comparison of two versions of an entity.
//!
//! Both versions are serialized to BSON and compared key by key. Keys listed as
//! identity fields are never compared. An absent key and an explicit `null` are
//! the same value. Changed values are rendered to display strings so that they
//! can be stored in a [`ChangeRecord`](crate::audit::ChangeRecord).

use bson::{Bson, Document as BsonDocument, Uuid, spec::BinarySubtype};
use chrono::{DateTime, FixedOffset};
use std::fmt::Write;

use crate::{
    config::{DEFAULT_DATE_FORMAT, EntityConfig},
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// One property whose value differs between two versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiffEngine {
    identity_fields: Vec<String>,
    date_format: String,
    utc_offset_seconds: i32,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::from_config(&EntityConfig::default())
    }
}

impl DiffEngine {
    pub fn new(identity_fields: Vec<String>, date_format: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self {
            identity_fields,
            date_format: date_format.into(),
            utc_offset_seconds: utc_offset_minutes * 60,
        }
    }

    pub fn from_config(config: &EntityConfig) -> Self {
        Self::new(config.identity_fields.clone(), config.date_format.clone(), config.utc_offset_minutes)
    }

    /// Compares every non-identity property of `old` and `new`.
    pub fn diff<E: Document>(&self, old: &E, new: &E) -> DocumentStoreResult<Vec<PropertyChange>> {
        self.diff_documents(&old.to_document()?, &new.to_document()?, None)
    }

    /// Compares only the named properties of `old` and `new`.
    pub fn diff_properties<E: Document>(
        &self,
        old: &E,
        new: &E,
        properties: &[String],
    ) -> DocumentStoreResult<Vec<PropertyChange>> {
        self.diff_documents(&old.to_document()?, &new.to_document()?, Some(properties))
    }

    /// Compares two serialized versions.
    ///
    /// With `only` set, just those keys are compared, in the given order. Otherwise
    /// the keys of `old` are visited in document order followed by keys only `new` has.
    pub fn diff_documents(
        &self,
        old: &BsonDocument,
        new: &BsonDocument,
        only: Option<&[String]>,
    ) -> DocumentStoreResult<Vec<PropertyChange>> {
        let keys: Vec<&str> = match only {
            Some(properties) => properties.iter().map(String::as_str).collect(),
            None => old
                .keys()
                .chain(new.keys().filter(|k| !old.contains_key(k.as_str())))
                .map(String::as_str)
                .collect(),
        };

        let mut changes = Vec::new();

        for key in keys {
            if self.is_identity(key) {
                continue;
            }

            let before = present(old.get(key));
            let after = present(new.get(key));
            if before == after {
                continue;
            }

            changes.push(PropertyChange {
                property: key.to_string(),
                old_value: before.map(|v| self.render(v)).transpose()?.flatten(),
                new_value: after.map(|v| self.render(v)).transpose()?.flatten(),
            });
        }

        Ok(changes)
    }

    /// Renders a stored value to its display form. `null` renders to `None`.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Conversion`] for binary data that is not a UUID and for
    /// BSON kinds without a display form (regular expressions, code, min/max keys).
    pub fn render(&self, value: &Bson) -> DocumentStoreResult<Option<String>> {
        Ok(Some(match value {
            Bson::Null | Bson::Undefined => return Ok(None),
            Bson::String(s) => s.clone(),
            Bson::Int32(n) => n.to_string(),
            Bson::Int64(n) => n.to_string(),
            Bson::Double(n) => n.to_string(),
            Bson::Boolean(b) => b.to_string(),
            Bson::DateTime(dt) => self.render_date(dt.timestamp_millis())?,
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::Binary(binary) => match binary.subtype {
                BinarySubtype::Uuid | BinarySubtype::UuidOld => {
                    let bytes: [u8; 16] = binary.bytes.as_slice().try_into().map_err(|_| {
                        DocumentStoreError::Conversion(format!(
                            "uuid binary holds {} bytes",
                            binary.bytes.len()
                        ))
                    })?;

                    Uuid::from_bytes(bytes).to_string()
                }
                subtype => {
                    return Err(DocumentStoreError::Conversion(format!(
                        "binary value of subtype {subtype:?} has no display form"
                    )));
                }
            },
            Bson::Document(_) | Bson::Array(_) | Bson::Decimal128(_) | Bson::Timestamp(_) => value.to_string(),
            other => {
                return Err(DocumentStoreError::Conversion(format!(
                    "{:?} value has no display form",
                    other.element_type()
                )));
            }
        }))
    }

    fn render_date(&self, millis: i64) -> DocumentStoreResult<String> {
        let offset = FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            DocumentStoreError::Conversion(format!("invalid utc offset of {} seconds", self.utc_offset_seconds))
        })?;
        let instant = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| DocumentStoreError::Conversion(format!("timestamp {millis} is out of range")))?
            .with_timezone(&offset);

        let format = if self.date_format.is_empty() {
            DEFAULT_DATE_FORMAT
        } else {
            &self.date_format
        };

        let mut rendered = String::new();
        write!(rendered, "{}", instant.format(format))
            .map_err(|_| DocumentStoreError::Conversion(format!("invalid date format '{format}'")))?;

        Ok(rendered)
    }

    fn is_identity(&self, key: &str) -> bool {
        key == "_id" || self.identity_fields.iter().any(|f| f == key)
    }
}

fn present(value: Option<&Bson>) -> Option<&Bson> {
    value.filter(|v| !matches!(v, Bson::Null | Bson::Undefined))
}
