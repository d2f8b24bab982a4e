//! In-memory document storage backend for entitylayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware locks for concurrent access and is ideal for development and
//! testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Serialized counters** - Sequence increments go through a single async mutex
//! - **Full query support** - Filtering on dotted paths, multi-key sorting and pagination
//!
//! # Quick Start
//!
//! ```ignore
//! use entitylayer::{DocumentStore, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     assert_eq!(store.sequences().next("invoices", 1).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as entitylayer_memory;

pub mod store;
mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
