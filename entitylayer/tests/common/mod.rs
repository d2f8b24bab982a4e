//! Shared fixtures: a `Customer` entity with its field registry and configuration.

#![allow(dead_code)]

use std::sync::Arc;

use entitylayer::{
    audit::AuditContext,
    bson::{DateTime, Uuid},
    config::EntityConfig,
    document::{Document, Entity},
    memory::InMemoryStore,
    query::{Expr, Filter, Sort},
    registry::FieldRegistry,
    store::DocumentStore,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub const SLUG_PREFIX: &str = "U";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub balance: f64,
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime>,
    #[serde(default)]
    pub modified_by: Option<String>,
}

impl Customer {
    pub fn new(name: &str, email: Option<&str>, city: Option<&str>, balance: f64) -> Self {
        Self {
            id: None,
            slug: None,
            sequence: None,
            name: name.to_string(),
            email: email.map(str::to_string),
            city: city.map(str::to_string),
            balance,
            active: true,
            created_at: None,
            created_by: None,
            modified_at: None,
            modified_by: None,
        }
    }

    pub fn with_id(mut self) -> Self {
        self.id = Some(Uuid::new());
        self
    }
}

impl Document for Customer {
    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn collection_name() -> &'static str {
        "customers"
    }
}

impl Entity for Customer {
    fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn assign_slug(&mut self, slug: String, sequence: i64) {
        self.slug = Some(slug);
        self.sequence = Some(sequence);
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn stamp(&mut self, context: &AuditContext, created: bool) {
        if created {
            self.created_at = Some(context.timestamp);
            self.created_by = Some(context.user.clone());
        }
        self.modified_at = Some(context.timestamp);
        self.modified_by = Some(context.user.clone());
    }

    fn duplicate_filter(&self) -> Option<Expr> {
        self.email.as_deref().map(|email| Filter::eq("email", email))
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("customer name must not be blank".to_string());
        }

        Ok(())
    }
}

pub fn registry() -> Arc<FieldRegistry<Customer>> {
    Arc::new(
        FieldRegistry::<Customer>::builder()
            .field("name", |c| &c.name, |c| &mut c.name)
            .field("email", |c| &c.email, |c| &mut c.email)
            .field("city", |c| &c.city, |c| &mut c.city)
            .field("balance", |c| &c.balance, |c| &mut c.balance)
            .field("active", |c| &c.active, |c| &mut c.active)
            .build(),
    )
}

pub fn config() -> EntityConfig {
    EntityConfig::builder()
        .with_slug_prefix(SLUG_PREFIX)
        .with_filterable_fields(["name", "email", "city", "balance", "active", "created_at"])
        .with_default_sort(vec![Sort::asc("name")])
        .build()
}

pub fn store() -> DocumentStore<InMemoryStore> {
    init_tracing();
    DocumentStore::new(InMemoryStore::new())
}

pub fn ctx() -> AuditContext {
    AuditContext::interactive("alice")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
