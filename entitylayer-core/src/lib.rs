//! A generic persistence and query layer for entity types kept in a document store.
//!
//! This crate is the core of the entitylayer project and provides:
//!
//! - **Document traits** ([`document`]) - Storage and lifecycle contracts for entity types
//! - **Store backend abstraction** ([`backend`]) - The storage facade every backend implements
//! - **Query AST** ([`query`]) - Store-neutral predicates, ordering and paging
//! - **Grid filters** ([`filter`], [`compile`]) - Typed column filters compiled into queries
//! - **Paging** ([`page`]) - Page requests and page results
//! - **Sequences and slugs** ([`sequence`], [`slug`]) - Atomic counters and human-readable identifiers
//! - **Diffing and auditing** ([`diff`], [`audit`]) - Field-level change detection and change records
//! - **Repositories** ([`repository`]) - Patch, create-or-overwrite, import and delete flows
//! - **Document store** ([`store`]) - Entry point tying a backend to the above
//! - **Error handling** ([`error`]) - Error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use entitylayer::{Document, Entity};
//! use bson::Uuid;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Customer {
//!     pub id: Option<Uuid>,
//!     pub slug: Option<String>,
//!     pub sequence: Option<i64>,
//!     pub name: String,
//!     pub active: bool,
//! }
//!
//! impl Document for Customer {
//!     fn id(&self) -> Option<Uuid> { self.id }
//!     fn set_id(&mut self, id: Uuid) { self.id = Some(id); }
//!     fn collection_name() -> &'static str { "customers" }
//! }
//!
//! impl Entity for Customer {
//!     fn slug(&self) -> Option<&str> { self.slug.as_deref() }
//!     fn assign_slug(&mut self, slug: String, sequence: i64) {
//!         self.slug = Some(slug);
//!         self.sequence = Some(sequence);
//!     }
//!     fn is_active(&self) -> bool { self.active }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as entitylayer_core;

pub mod audit;
pub mod backend;
pub mod collection;
pub mod compile;
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod filter;
pub mod page;
pub mod query;
pub mod registry;
pub mod repository;
pub mod sequence;
pub mod slug;
pub mod store;
