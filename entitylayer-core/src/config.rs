//! Per-type repository configuration.
//!
//! An [`EntityConfig`] tells an [`EntityRepository`](crate::repository::EntityRepository)
//! how a collection is laid out: which slug prefix it uses, which fields are
//! eligible for filtering, how results are ordered by default, and which
//! stored field names carry identity and the soft-delete flag.
//!
//! Configurations are plain data. They can be assembled with
//! [`EntityConfig::builder`] or deserialized from any serde format; missing
//! keys fall back to [`EntityConfig::default`].
//!
//! ```ignore
//! let config = EntityConfig::builder()
//!     .with_slug_prefix("CUS")
//!     .with_filterable_fields(["name", "balance", "joined_at"])
//!     .with_default_sort(vec![Sort::asc("name")])
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

use crate::query::Sort;

pub const DEFAULT_BLANK_SENTINEL: &str = "(Blanks)";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_AUDIT_COLLECTION: &str = "change_records";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Prefix for synthesized slugs. `None` leaves slugs unassigned.
    pub slug_prefix: Option<String>,
    /// Counter name used for slug sequences. Defaults to the collection name.
    pub sequence_name: Option<String>,
    /// Ordering applied when a request carries no sort directives.
    pub default_sort: Vec<Sort>,
    /// Fields that may appear as filter keys. Empty allows every field.
    pub filterable_fields: Vec<String>,
    /// Fields that never show up in a diff and are never overwritten by an
    /// overwrite or import.
    pub identity_fields: Vec<String>,
    pub id_field: String,
    pub slug_field: String,
    /// Field holding the sequence number a slug was derived from.
    pub sequence_field: String,
    pub active_field: String,
    /// Offset of the reference timezone used for day-boundary widening and
    /// date rendering, in minutes east of UTC.
    pub utc_offset_minutes: i32,
    /// `chrono` format string used when rendering dates into change records.
    pub date_format: String,
    /// Set-filter operand standing for "no value".
    pub blank_sentinel: String,
    pub audit_collection: String,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            slug_prefix: None,
            sequence_name: None,
            default_sort: Vec::new(),
            filterable_fields: Vec::new(),
            identity_fields: [
                "id",
                "slug",
                "sequence",
                "created_at",
                "created_by",
                "modified_at",
                "modified_by",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            id_field: "id".to_string(),
            slug_field: "slug".to_string(),
            sequence_field: "sequence".to_string(),
            active_field: "active".to_string(),
            utc_offset_minutes: 0,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            blank_sentinel: DEFAULT_BLANK_SENTINEL.to_string(),
            audit_collection: DEFAULT_AUDIT_COLLECTION.to_string(),
        }
    }
}

impl EntityConfig {
    pub fn builder() -> EntityConfigBuilder {
        EntityConfigBuilder::new()
    }

    /// The counter name for this type, falling back to the collection name.
    pub fn sequence_name_or<'a>(&'a self, collection: &'a str) -> &'a str {
        self.sequence_name.as_deref().unwrap_or(collection)
    }

    /// Whether `field` may be used as a filter key.
    ///
    /// With `deep` set, dotted paths are accepted when their first segment is
    /// filterable.
    pub fn is_filterable(&self, field: &str, deep: bool) -> bool {
        if self.filterable_fields.is_empty() {
            return true;
        }

        let key = if deep {
            field.split('.').next().unwrap_or(field)
        } else {
            field
        };

        self.filterable_fields.iter().any(|f| f == key)
    }

    pub fn is_identity_field(&self, field: &str) -> bool {
        self.identity_fields.iter().any(|f| f == field)
    }

    pub fn utc_offset_millis(&self) -> i64 {
        i64::from(self.utc_offset_minutes) * 60_000
    }
}

/// Builder for [`EntityConfig`]. Unset values keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct EntityConfigBuilder {
    config: EntityConfig,
}

impl EntityConfigBuilder {
    pub fn new() -> Self {
        Self { config: EntityConfig::default() }
    }

    pub fn with_slug_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.slug_prefix = Some(prefix.into());
        self
    }

    pub fn with_sequence_name(mut self, name: impl Into<String>) -> Self {
        self.config.sequence_name = Some(name.into());
        self
    }

    pub fn with_default_sort(mut self, sort: Vec<Sort>) -> Self {
        self.config.default_sort = sort;
        self
    }

    pub fn with_filterable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.filterable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identity_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.identity_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_active_field(mut self, field: impl Into<String>) -> Self {
        self.config.active_field = field.into();
        self
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.config.utc_offset_minutes = minutes;
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.config.date_format = format.into();
        self
    }

    pub fn with_blank_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.blank_sentinel = sentinel.into();
        self
    }

    pub fn with_audit_collection(mut self, collection: impl Into<String>) -> Self {
        self.config.audit_collection = collection.into();
        self
    }

    pub fn build(self) -> EntityConfig {
        self.config
    }
}
