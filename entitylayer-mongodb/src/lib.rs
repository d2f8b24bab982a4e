//! MongoDB backend implementation for entitylayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Predicates are translated into native filter documents, sequences are kept in
//! a `_counters` collection and incremented with a single atomic
//! `findOneAndUpdate`, and unique sparse indexes back slug and sequence fields.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! entitylayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use entitylayer::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as entitylayer_mongodb;

pub mod store;
pub mod query;
mod sanitizer;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
pub use query::MongoQueryTranslator;
