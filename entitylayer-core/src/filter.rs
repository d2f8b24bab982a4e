//! Typed column filters and their translation into predicates.
//!
//! A [`FilterDescription`] is one column filter as sent by a data grid: a
//! number, date, boolean, set or exact-match condition. [`PredicateBuilder`]
//! turns one description into a store-neutral [`Expr`].
//!
//! Filters decode from JSON with a `filterType` tag:
//!
//! ```json
//! { "filterType": "number", "type": "inRange", "filter": 10, "filterTo": 20 }
//! { "filterType": "number", "operator": "OR",
//!   "condition1": { "type": "lessThan", "filter": 0 },
//!   "condition2": { "type": "greaterThan", "filter": 100 } }
//! { "filterType": "date", "type": "equals", "dateFrom": 1700000000000 }
//! { "filterType": "set", "values": ["gold", "(Blanks)"] }
//! ```
//!
//! Any other `filterType` decodes to [`FilterDescription::Unsupported`], which
//! builds no predicate. Operators that make no sense for a variant (`lessThan`
//! on a boolean, for instance) are skipped the same way.

use bson::{Bson, DateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{DEFAULT_BLANK_SENTINEL, EntityConfig},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Filter},
};

const DAY_MILLIS: i64 = 86_400_000;

/// Comparison operator carried by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    InRange,
    Exists,
    #[serde(alias = "doesNotExist")]
    NotExists,
}

/// Boolean operator joining the two halves of a compound number filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberCondition {
    #[serde(rename = "type")]
    pub operator: FilterOperator,
    #[serde(default)]
    pub filter: Option<f64>,
    #[serde(default)]
    pub filter_to: Option<f64>,
}

impl NumberCondition {
    pub fn new(operator: FilterOperator, filter: f64) -> Self {
        Self { operator, filter: Some(filter), filter_to: None }
    }

    pub fn range(from: f64, to: f64) -> Self {
        Self { operator: FilterOperator::InRange, filter: Some(from), filter_to: Some(to) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberFilter {
    Compound {
        operator: Combinator,
        condition1: NumberCondition,
        condition2: NumberCondition,
    },
    Single(NumberCondition),
}

/// A date filter over epoch-millisecond bounds.
///
/// Unless `exact_match` is set, bounds are widened to whole calendar days in
/// the reference timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFilter {
    #[serde(rename = "type")]
    pub operator: FilterOperator,
    #[serde(default)]
    pub date_from: Option<i64>,
    #[serde(default)]
    pub date_to: Option<i64>,
    #[serde(default)]
    pub exact_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanFilter {
    #[serde(rename = "type", default)]
    pub operator: Option<FilterOperator>,
    pub filter: bool,
}

/// Membership (`equals`, the default) or exclusion (`notEqual`) over a value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetFilter {
    #[serde(rename = "type", default)]
    pub operator: Option<FilterOperator>,
    #[serde(default)]
    pub values: Vec<Bson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactMatchFilter {
    #[serde(rename = "type", default)]
    pub operator: Option<FilterOperator>,
    #[serde(default)]
    pub filter: Option<Bson>,
}

/// One column filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "camelCase")]
pub enum FilterDescription {
    Number(NumberFilter),
    Date(DateFilter),
    Boolean(BooleanFilter),
    Set(SetFilter),
    ExactMatch(ExactMatchFilter),
    /// Any filter type this crate does not understand. Builds no predicate.
    #[serde(other)]
    Unsupported,
}

/// Converts one [`FilterDescription`] into a predicate over one field.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    utc_offset_millis: i64,
    blank_sentinel: String,
}

impl Default for PredicateBuilder {
    fn default() -> Self {
        Self { utc_offset_millis: 0, blank_sentinel: DEFAULT_BLANK_SENTINEL.to_string() }
    }
}

impl PredicateBuilder {
    pub fn new(utc_offset_minutes: i32, blank_sentinel: impl Into<String>) -> Self {
        Self {
            utc_offset_millis: i64::from(utc_offset_minutes) * 60_000,
            blank_sentinel: blank_sentinel.into(),
        }
    }

    pub fn from_config(config: &EntityConfig) -> Self {
        Self {
            utc_offset_millis: config.utc_offset_millis(),
            blank_sentinel: config.blank_sentinel.clone(),
        }
    }

    /// Builds the predicate for `field`, or `None` when the filter is
    /// unsupported and should not constrain the result.
    pub fn build(&self, field: &str, filter: &FilterDescription) -> DocumentStoreResult<Option<Expr>> {
        match filter {
            FilterDescription::Number(number) => self.number(field, number),
            FilterDescription::Date(date) => self.date(field, date),
            FilterDescription::Boolean(boolean) => Ok(self.boolean(field, boolean)),
            FilterDescription::Set(set) => Ok(self.set(field, set)),
            FilterDescription::ExactMatch(exact) => Ok(self.exact_match(field, exact)),
            FilterDescription::Unsupported => {
                debug!(target: "entitylayer::query", field, "ignoring unsupported filter type");
                Ok(None)
            }
        }
    }

    /// Start and end (both inclusive) of the calendar day containing `millis`,
    /// in the reference timezone.
    ///
    /// Fails with a validation error when the day falls outside the range of
    /// a millisecond timestamp.
    pub fn day_bounds(&self, millis: i64) -> DocumentStoreResult<(i64, i64)> {
        let start = millis
            .checked_add(self.utc_offset_millis)
            .map(|local| local.div_euclid(DAY_MILLIS))
            .and_then(|local_day| local_day.checked_mul(DAY_MILLIS))
            .and_then(|local_start| local_start.checked_sub(self.utc_offset_millis));
        let bounds = start.and_then(|start| Some((start, start.checked_add(DAY_MILLIS - 1)?)));

        bounds.ok_or_else(|| DocumentStoreError::validation(format!("date {millis} is out of range")))
    }

    fn number(&self, field: &str, filter: &NumberFilter) -> DocumentStoreResult<Option<Expr>> {
        match filter {
            NumberFilter::Single(condition) => self.number_condition(field, condition),
            NumberFilter::Compound { operator, condition1, condition2 } => {
                let first = self.number_condition(field, condition1)?;
                let second = self.number_condition(field, condition2)?;

                Ok(match operator {
                    Combinator::And => match (first, second) {
                        (Some(a), Some(b)) => Some(Filter::and([a, b])),
                        (single, None) | (None, single) => single,
                    },
                    // An ignored half places no constraint, so the disjunction matches everything.
                    Combinator::Or => match (first, second) {
                        (Some(a), Some(b)) => Some(Filter::or([a, b])),
                        _ => None,
                    },
                })
            }
        }
    }

    fn number_condition(&self, field: &str, condition: &NumberCondition) -> DocumentStoreResult<Option<Expr>> {
        let operand = |value: Option<f64>, name: &str| {
            value.map(Bson::Double).ok_or_else(|| {
                DocumentStoreError::validation(format!("number filter on '{field}' is missing '{name}'"))
            })
        };

        Ok(Some(match condition.operator {
            FilterOperator::Exists => Filter::exists(field),
            FilterOperator::NotExists => Filter::not_exists(field),
            FilterOperator::Equals => Filter::eq(field, operand(condition.filter, "filter")?),
            FilterOperator::NotEqual => Filter::ne(field, operand(condition.filter, "filter")?),
            FilterOperator::LessThan => Filter::lt(field, operand(condition.filter, "filter")?),
            FilterOperator::LessThanOrEqual => Filter::lte(field, operand(condition.filter, "filter")?),
            FilterOperator::GreaterThan => Filter::gt(field, operand(condition.filter, "filter")?),
            FilterOperator::GreaterThanOrEqual => Filter::gte(field, operand(condition.filter, "filter")?),
            FilterOperator::InRange => Filter::and([
                Filter::gte(field, operand(condition.filter, "filter")?),
                Filter::lte(field, operand(condition.filter_to, "filterTo")?),
            ]),
        }))
    }

    fn date(&self, field: &str, filter: &DateFilter) -> DocumentStoreResult<Option<Expr>> {
        let bound = |value: Option<i64>, name: &str| {
            value.ok_or_else(|| {
                DocumentStoreError::validation(format!("date filter on '{field}' is missing '{name}'"))
            })
        };
        let from = || bound(filter.date_from, "dateFrom");
        let to = || bound(filter.date_to, "dateTo");

        let at = |millis: i64| Bson::DateTime(DateTime::from_millis(millis));
        let exact = filter.exact_match;
        let start_of = |millis: i64| if exact { Ok(millis) } else { self.day_bounds(millis).map(|(start, _)| start) };
        let end_of = |millis: i64| if exact { Ok(millis) } else { self.day_bounds(millis).map(|(_, end)| end) };

        Ok(Some(match filter.operator {
            FilterOperator::Exists => Filter::exists(field),
            FilterOperator::NotExists => Filter::not_exists(field),
            FilterOperator::Equals if exact => Filter::eq(field, at(from()?)),
            FilterOperator::Equals => {
                let from = from()?;
                Filter::and([Filter::gte(field, at(start_of(from)?)), Filter::lte(field, at(end_of(from)?))])
            }
            FilterOperator::NotEqual if exact => Filter::ne(field, at(from()?)),
            // Complement of the day interval rather than a negated equality.
            FilterOperator::NotEqual => {
                let from = from()?;
                Filter::or([Filter::lt(field, at(start_of(from)?)), Filter::gt(field, at(end_of(from)?))])
            }
            FilterOperator::LessThan => Filter::lt(field, at(start_of(from()?)?)),
            FilterOperator::LessThanOrEqual => Filter::lte(field, at(end_of(from()?)?)),
            FilterOperator::GreaterThan => Filter::gt(field, at(end_of(from()?)?)),
            FilterOperator::GreaterThanOrEqual => Filter::gte(field, at(start_of(from()?)?)),
            FilterOperator::InRange => Filter::and([
                Filter::gte(field, at(start_of(from()?)?)),
                Filter::lte(field, at(end_of(to()?)?)),
            ]),
        }))
    }

    fn boolean(&self, field: &str, filter: &BooleanFilter) -> Option<Expr> {
        match filter.operator.unwrap_or(FilterOperator::Equals) {
            FilterOperator::Equals => Some(Filter::eq(field, filter.filter)),
            FilterOperator::NotEqual => Some(Filter::ne(field, filter.filter)),
            operator => {
                debug!(target: "entitylayer::query", field, ?operator, "ignoring operator for boolean filter");
                None
            }
        }
    }

    fn set(&self, field: &str, filter: &SetFilter) -> Option<Expr> {
        let (blanks, values): (Vec<&Bson>, Vec<&Bson>) = filter
            .values
            .iter()
            .partition(|value| self.is_blank(value));

        let mut clauses = Vec::new();

        match filter.operator.unwrap_or(FilterOperator::Equals) {
            FilterOperator::Equals => {
                if !values.is_empty() {
                    clauses.push(Filter::any_of(field, values.into_iter().cloned()));
                }
                if !blanks.is_empty() {
                    clauses.push(self.blank(field));
                }

                match clauses.len() {
                    0 => None,
                    1 => clauses.pop(),
                    _ => Some(Filter::or(clauses)),
                }
            }
            FilterOperator::NotEqual => {
                if !values.is_empty() {
                    clauses.push(Filter::none_of(field, values.into_iter().cloned()));
                }
                if !blanks.is_empty() {
                    clauses.push(self.not_blank(field));
                }

                match clauses.len() {
                    0 => None,
                    1 => clauses.pop(),
                    _ => Some(Filter::and(clauses)),
                }
            }
            operator => {
                debug!(target: "entitylayer::query", field, ?operator, "ignoring operator for set filter");
                None
            }
        }
    }

    fn exact_match(&self, field: &str, filter: &ExactMatchFilter) -> Option<Expr> {
        let value = filter.filter.clone().unwrap_or(Bson::Null);

        match filter.operator.unwrap_or(FilterOperator::Equals) {
            FilterOperator::Equals => Some(Filter::eq(field, value)),
            FilterOperator::NotEqual => Some(Filter::ne(field, value)),
            FilterOperator::Exists => Some(Filter::exists(field)),
            FilterOperator::NotExists => Some(Filter::not_exists(field)),
            operator => {
                debug!(target: "entitylayer::query", field, ?operator, "ignoring operator for exact-match filter");
                None
            }
        }
    }

    fn is_blank(&self, value: &Bson) -> bool {
        match value {
            Bson::Null => true,
            Bson::String(s) => s.is_empty() || *s == self.blank_sentinel,
            _ => false,
        }
    }

    /// Every stored representation of "nothing": absent, null, empty string, empty list.
    fn blank(&self, field: &str) -> Expr {
        Filter::or([
            Filter::not_exists(field),
            Filter::eq(field, Bson::Null),
            Filter::eq(field, ""),
            Filter::eq(field, Bson::Array(Vec::new())),
        ])
    }

    fn not_blank(&self, field: &str) -> Expr {
        Filter::and([
            Filter::exists(field),
            Filter::ne(field, Bson::Null),
            Filter::ne(field, ""),
            Filter::ne(field, Bson::Array(Vec::new())),
        ])
    }
}
