//! Audit trail types.
//!
//! Every coordinator call receives an [`AuditContext`] describing who is
//! acting, through which channel, and at what instant. Field-level changes are
//! persisted as [`ChangeRecord`] documents in a dedicated collection. Records
//! are append-only: nothing in this crate updates or deletes them.

use bson::{DateTime, Uuid};
use serde::{Deserialize, Serialize};

use crate::{diff::PropertyChange, document::Document};

/// The kind of change a [`ChangeRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// The channel through which a change entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// A single user-driven create, patch or delete.
    Interactive,
    /// A bulk import.
    Import,
}

/// Caller identity and timing for one coordinator call.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    pub user: String,
    pub source: ChangeSource,
    pub timestamp: DateTime,
}

impl AuditContext {
    pub fn new(user: impl Into<String>, source: ChangeSource, timestamp: DateTime) -> Self {
        Self { user: user.into(), source, timestamp }
    }

    /// An interactive context stamped with the current time.
    pub fn interactive(user: impl Into<String>) -> Self {
        Self::new(user, ChangeSource::Interactive, DateTime::now())
    }

    /// An import context stamped with the current time.
    pub fn import(user: impl Into<String>) -> Self {
        Self::new(user, ChangeSource::Import, DateTime::now())
    }

    /// The same caller and instant, attributed to a different source.
    pub fn with_source(&self, source: ChangeSource) -> Self {
        Self { source, ..self.clone() }
    }
}

/// One field-level audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub entity_collection: String,
    pub entity_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_slug: Option<String>,
    pub action: ChangeAction,
    pub source: ChangeSource,
    /// `None` for whole-entity creates and deletes.
    #[serde(default)]
    pub prop_changed: Option<String>,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime,
}

impl ChangeRecord {
    /// A record that is not tied to a single property (create, hard delete).
    pub fn entity_level(
        collection: &str,
        entity_id: Uuid,
        entity_slug: Option<&str>,
        action: ChangeAction,
        context: &AuditContext,
    ) -> Self {
        Self {
            id: None,
            entity_collection: collection.to_string(),
            entity_id,
            entity_slug: entity_slug.map(str::to_string),
            action,
            source: context.source,
            prop_changed: None,
            old_value: None,
            new_value: None,
            changed_by: context.user.clone(),
            changed_at: context.timestamp,
        }
    }

    /// A record for one changed property.
    pub fn for_property(
        collection: &str,
        entity_id: Uuid,
        entity_slug: Option<&str>,
        action: ChangeAction,
        change: PropertyChange,
        context: &AuditContext,
    ) -> Self {
        Self {
            prop_changed: Some(change.property),
            old_value: change.old_value,
            new_value: change.new_value,
            ..Self::entity_level(collection, entity_id, entity_slug, action, context)
        }
    }
}

impl Document for ChangeRecord {
    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn collection_name() -> &'static str {
        "change_records"
    }
}
