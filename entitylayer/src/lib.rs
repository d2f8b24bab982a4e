//! Main entitylayer crate providing a unified interface for entity persistence.
//!
//! This crate is the primary entry point for users of the entitylayer framework.
//! It re-exports the core types from the sub-crates and gives access to the
//! storage backends.
//!
//! # Features
//!
//! - **Grid filters** - Typed column filters compiled into store-neutral predicates
//! - **Human-readable slugs** - Prefix plus an atomically allocated sequence number
//! - **Audited patches** - Field-level diffs recorded as change records
//! - **Bulk import** - Create, overwrite or ignore each entity in one pass
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use entitylayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!
//!     let registry = Arc::new(
//!         FieldRegistry::<Customer>::builder()
//!             .field("name", |c| &c.name, |c| &mut c.name)
//!             .field("city", |c| &c.city, |c| &mut c.city)
//!             .build(),
//!     );
//!     let config = EntityConfig::builder()
//!         .with_slug_prefix("CU")
//!         .with_filterable_fields(["name", "city"])
//!         .build();
//!
//!     let customers = store.repository::<Customer>(config, registry);
//!     customers.ensure_indexes().await?;
//!
//!     let ctx = AuditContext::interactive("alice");
//!     let created = customers.create_or_overwrite(Customer::new("Acme", "Oslo"), &ctx).await?;
//!     assert_eq!(created.slug(), Some("CU1"));
//!
//!     let patch = Customer::new("Acme", "Bergen");
//!     customers.patch_by_slug("CU1", &patch, &["city"], &ctx).await?;
//!
//!     let city: FilterDescription = serde_json::from_value(serde_json::json!({
//!         "filterType": "set",
//!         "values": ["Bergen"],
//!     }))?;
//!     let request = FilterRequest::new(0, 20).with_filter("city", city);
//!     let page = customers.find_page(&request).await?;
//!     assert_eq!(page.total_elements, 1);
//!
//!     store.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use entitylayer_core::{
    audit, backend, collection, compile, config, diff, document, error, filter, page, query,
    registry, repository, sequence, slug, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use entitylayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use entitylayer_mongodb::{MongoDbStore, MongoDbStoreBuilder, MongoQueryTranslator};
}
