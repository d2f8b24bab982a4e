//! Convenient re-exports of commonly used types from entitylayer.
//!
//! ```ignore
//! use entitylayer::prelude::*;
//! ```

pub use entitylayer_core::{
    audit::{AuditContext, ChangeAction, ChangeRecord, ChangeSource},
    backend::{StoreBackend, StoreBackendBuilder},
    collection::TypedCollection,
    compile::{CompiledQuery, FilterRequest, QueryCompiler},
    config::{EntityConfig, EntityConfigBuilder},
    diff::{DiffEngine, PropertyChange},
    document::{Document, DocumentExt, Entity},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{FilterDescription, FilterOperator, PredicateBuilder},
    page::{Page, PageRequest},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    registry::{FieldRegistry, FieldRegistryBuilder},
    repository::{EntityRepository, ImportAction},
    sequence::SequenceAllocator,
    slug::SlugAssigner,
    store::DocumentStore,
};
