//! Compilation of grid filter requests into a predicate and an ordering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    config::EntityConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{FilterDescription, PredicateBuilder},
    page::PageRequest,
    query::{Expr, Filter, Sort},
};

fn default_size() -> i64 {
    20
}

/// A paginated, sortable, multi-column filter request.
///
/// ```json
/// {
///   "page": 0,
///   "size": 25,
///   "filters": { "balance": { "filterType": "number", "type": "greaterThan", "filter": 0 } },
///   "sort": [ { "colId": "name", "sort": "asc" } ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterDescription>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    /// Accept dotted paths whose first segment is a filterable field.
    #[serde(default)]
    pub deep_filter: bool,
}

impl Default for FilterRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: default_size(),
            filters: BTreeMap::new(),
            sort: Vec::new(),
            deep_filter: false,
        }
    }
}

impl FilterRequest {
    pub fn new(page: i64, size: i64) -> Self {
        Self { page, size, ..Self::default() }
    }

    pub fn with_filter(mut self, field: impl Into<String>, filter: FilterDescription) -> Self {
        self.filters.insert(field.into(), filter);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_deep_filter(mut self, deep: bool) -> Self {
        self.deep_filter = deep;
        self
    }

    pub fn page_request(&self) -> DocumentStoreResult<PageRequest> {
        PageRequest::try_new(self.page, self.size)
    }
}

/// A compiled predicate and ordering, ready for the paged executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub filter: Expr,
    pub sort: Vec<Sort>,
}

#[derive(Debug, Clone)]
pub struct QueryCompiler<'a> {
    config: &'a EntityConfig,
    predicates: PredicateBuilder,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(config: &'a EntityConfig) -> Self {
        Self { config, predicates: PredicateBuilder::from_config(config) }
    }

    /// Conjoins one predicate per filter entry. An empty map compiles to the
    /// always-true predicate.
    pub fn compile(
        &self,
        filters: &BTreeMap<String, FilterDescription>,
        sort: &[Sort],
        deep_filter: bool,
    ) -> DocumentStoreResult<CompiledQuery> {
        let mut clauses = Vec::with_capacity(filters.len());

        for (field, description) in filters {
            if !self.config.is_filterable(field, deep_filter) {
                return Err(DocumentStoreError::validation(format!("field '{field}' is not filterable")));
            }
            if let Some(clause) = self.predicates.build(field, description)? {
                clauses.push(clause);
            }
        }

        let compiled = CompiledQuery { filter: Filter::and(clauses), sort: self.ordering(sort) };

        debug!(target: "entitylayer::query", filter = ?compiled.filter, sort = ?compiled.sort, "compiled filter request");

        Ok(compiled)
    }

    /// Compiles a full request, validating its page parameters first.
    pub fn compile_request(&self, request: &FilterRequest) -> DocumentStoreResult<(CompiledQuery, PageRequest)> {
        let page = request.page_request()?;
        let compiled = self.compile(&request.filters, &request.sort, request.deep_filter)?;

        Ok((compiled, page))
    }

    /// The ordering for `sort`: directives in the given order, each refining the
    /// ones before it. A field named twice keeps its first directive. Without
    /// directives the configured default applies.
    pub fn ordering(&self, sort: &[Sort]) -> Vec<Sort> {
        let source: &[Sort] = if sort.is_empty() { &self.config.default_sort } else { sort };

        source.iter().fold(Vec::new(), |mut ordering: Vec<Sort>, directive| {
            if !ordering.iter().any(|s| s.field == directive.field) {
                ordering.push(directive.clone());
            }
            ordering
        })
    }
}
