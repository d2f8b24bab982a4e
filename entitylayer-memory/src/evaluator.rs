//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for query expressions,
//! enabling filtering and ordering of BSON documents without a database.
//!
//! Matching follows document-store conventions: a missing field behaves like
//! `null` for equality and membership tests and never satisfies a range
//! comparison, and an array field matches a scalar when any element does.
//! A dotted path that crosses an array of sub-documents collects the value
//! from every element, so `items.name` matches when any item's name does.

use std::{borrow::Cow, cmp::Ordering, collections::HashMap};
use bson::{Bson, datetime::DateTime, oid::ObjectId};

use entitylayer_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Integers and floats are normalized to `f64` so that an `Int32` stored value
/// compares equal to a `Double` operand.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(HashMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    Binary(u8, &'a [u8]),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    /// Kinds with no useful ordering (regex, code, keys). Equal only to nothing.
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Binary(binary) => Comparable::Binary(u8::from(binary.subtype), &binary.bytes),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Opaque,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of this kind in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Binary(..) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
            Comparable::Opaque => 9,
        }
    }

    /// Total order used for sorting: null first, then by kind, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| match (self, other) {
                (Comparable::Array(a), Comparable::Array(b)) => a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.sort_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len())),
                _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
            })
    }

    /// Equality with array fan-out: an array matches a scalar when any element equals it.
    fn matches(&self, value: &Comparable<'a>) -> bool {
        if self == value {
            return true;
        }

        match self {
            Comparable::Array(items) => items.iter().any(|item| item == value),
            _ => false,
        }
    }

    fn satisfies(&self, op: &FieldOp, value: &Comparable<'a>) -> bool {
        if let Comparable::Array(items) = self
            && !matches!(value, Comparable::Array(_))
        {
            return items.iter().any(|item| item.satisfies(op, value));
        }

        match self.partial_cmp(value) {
            Some(ordering) => match op {
                FieldOp::Gt => ordering.is_gt(),
                FieldOp::Gte => ordering.is_ge(),
                FieldOp::Lt => ordering.is_lt(),
                FieldOp::Lte => ordering.is_le(),
                _ => false,
            },
            None => false,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Binary(sa, a), Comparable::Binary(sb, b)) => sa == sb && a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Binary(_, a), Comparable::Binary(_, b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a possibly dotted path. Numeric segments index into arrays; any
/// other segment is resolved in every sub-document of the array and the
/// results are gathered into one array.
pub(crate) fn lookup<'a>(document: &'a Bson, path: &str) -> Option<Cow<'a, Bson>> {
    let (segment, rest) = match path.split_once('.') {
        Some((segment, rest)) => (segment, Some(rest)),
        None => (path, None),
    };
    let descend = |value: &'a Bson| match rest {
        Some(rest) => lookup(value, rest),
        None => Some(Cow::Borrowed(value)),
    };

    match document {
        Bson::Document(doc) => doc.get(segment).and_then(descend),
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items.get(index).and_then(descend),
            Err(_) => {
                let mut found = Vec::new();
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    match lookup(item, path).map(Cow::into_owned) {
                        Some(Bson::Array(values)) => found.extend(values),
                        Some(value) => found.push(value),
                        None => {}
                    }
                }

                (!found.is_empty()).then(|| Cow::Owned(Bson::Array(found)))
            }
        },
        _ => None,
    }
}

/// Orders two documents by a list of sort directives, earlier directives first.
pub(crate) fn compare_documents(a: &Bson, b: &Bson, sort: &[Sort]) -> Ordering {
    sort.iter()
        .map(|directive| {
            let (a, b) = (lookup(a, &directive.field), lookup(b, &directive.field));
            let left = a.as_deref().map(Comparable::from).unwrap_or(Comparable::Null);
            let right = b.as_deref().map(Comparable::from).unwrap_or(Comparable::Null);

            match directive.direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn any_of(field: &str, left: &Comparable<'_>, values: &Comparable<'_>) -> DocumentStoreResult<bool> {
    match values {
        Comparable::Array(values) => Ok(values.iter().any(|v| left.matches(v))),
        _ => Err(DocumentStoreError::validation(format!(
            "membership test on '{field}' needs an array operand"
        ))),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Bson,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Bson) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    pub fn matches(document: &Bson, expr: &Expr) -> DocumentStoreResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Bson>,
        expr: &Expr,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let mut matched = Vec::new();
        for doc in documents {
            if Self::matches(doc, expr)? {
                matched.push(doc.clone());
            }
        }

        Ok(matched)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let stored = lookup(self.document, field);
        let left = stored.as_deref().map(Comparable::from).unwrap_or(Comparable::Null);
        let right = Comparable::from(value);

        match op {
            FieldOp::Eq => Ok(left.matches(&right)),
            FieldOp::Ne => Ok(!left.matches(&right)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                Ok(stored.is_some() && left.satisfies(op, &right))
            }
            FieldOp::AnyOf => any_of(field, &left, &right),
            FieldOp::NoneOf => any_of(field, &left, &right).map(|found| !found),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use entitylayer_core::query::Filter;

    fn matches(document: &Bson, expr: &Expr) -> bool {
        DocumentEvaluator::matches(document, expr).unwrap()
    }

    #[test]
    fn missing_field_semantics() {
        let document = Bson::Document(doc! { "name": "Alice" });

        assert!(matches(&document, &Filter::eq("city", Bson::Null)));
        assert!(matches(&document, &Filter::ne("city", "Oslo")));
        assert!(!matches(&document, &Filter::ne("city", Bson::Null)));
        assert!(matches(&document, &Filter::none_of("city", ["Oslo"])));
        assert!(!matches(&document, &Filter::gt("age", 1)));
    }

    #[test]
    fn numbers_compare_across_widths() {
        let document = Bson::Document(doc! { "age": 30_i32 });

        assert!(matches(&document, &Filter::eq("age", 30.0)));
        assert!(matches(&document, &Filter::gte("age", 30_i64)));
        assert!(!matches(&document, &Filter::lt("age", 30.0)));
    }

    #[test]
    fn arrays_fan_out() {
        let document = Bson::Document(doc! { "tags": ["gold", "vip"], "empty": Bson::Array(vec![]) });

        assert!(matches(&document, &Filter::eq("tags", "vip")));
        assert!(matches(&document, &Filter::any_of("tags", ["silver", "gold"])));
        assert!(!matches(&document, &Filter::none_of("tags", ["gold"])));
        assert!(matches(&document, &Filter::eq("empty", Bson::Array(vec![]))));
    }

    #[test]
    fn dotted_paths() {
        let document = Bson::Document(doc! { "address": { "city": "Oslo" }, "phones": ["1", "2"] });

        assert!(matches(&document, &Filter::eq("address.city", "Oslo")));
        assert!(matches(&document, &Filter::eq("phones.1", "2")));
        assert!(matches(&document, &Filter::not_exists("address.zip")));
    }

    #[test]
    fn dotted_paths_fan_out_over_sub_documents() {
        let document = Bson::Document(doc! {
            "items": [
                { "name": "bolt", "sizes": [4, 6] },
                { "name": "nut" },
                "loose",
            ],
        });

        assert!(matches(&document, &Filter::eq("items.name", "nut")));
        assert!(matches(&document, &Filter::eq("items.sizes", 6)));
        assert!(matches(&document, &Filter::gt("items.sizes", 5)));
        assert!(matches(&document, &Filter::eq("items.0.name", "bolt")));
        assert!(!matches(&document, &Filter::eq("items.name", "washer")));
        assert!(matches(&document, &Filter::exists("items.sizes")));
        assert!(matches(&document, &Filter::not_exists("items.weight")));
    }

    #[test]
    fn empty_or_matches_nothing() {
        let document = Bson::Document(doc! { "name": "Alice" });

        assert!(matches(&document, &Filter::all()));
        assert!(!matches(&document, &Filter::or(Vec::new())));
    }

    #[test]
    fn nulls_sort_first() {
        let a = Bson::Document(doc! { "n": 2 });
        let b = Bson::Document(doc! { "n": Bson::Null });
        let c = Bson::Document(doc! {});

        assert_eq!(compare_documents(&b, &a, &[Sort::asc("n")]), Ordering::Less);
        assert_eq!(compare_documents(&c, &a, &[Sort::asc("n")]), Ordering::Less);
        assert_eq!(compare_documents(&a, &c, &[Sort::desc("n")]), Ordering::Less);
    }
}
