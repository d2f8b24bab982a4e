//! Query translation from the entitylayer AST to MongoDB filter documents.

use bson::{Bson, Document, doc};

use entitylayer_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

use crate::sanitizer::ValueSanitizer;

/// Translates entitylayer query expressions into MongoDB query documents.
///
/// An empty AND becomes the match-all filter `{}`. An empty OR becomes
/// `{"$nor": [{}]}`, which matches nothing. Negation is expressed with `$nor`
/// since MongoDB has no top-level `$not`.
pub struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates `expr` into a filter document.
    pub fn translate(expr: &Expr) -> Result<Document, DocumentStoreError> {
        MongoQueryTranslator.visit_expr(expr)
    }

    /// Builds a multi-key sort document, preserving directive order.
    pub fn sort_document(sort: &[Sort]) -> Document {
        sort.iter()
            .map(|s| {
                let direction = match s.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (s.field.clone(), Bson::Int32(direction))
            })
            .collect()
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! { "$nor": [{}] });
        }

        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let value = ValueSanitizer::sanitize_value(value);

        let condition = match op {
            FieldOp::Eq => doc! { "$eq": value },
            FieldOp::Ne => doc! { "$ne": value },
            FieldOp::Gt => doc! { "$gt": value },
            FieldOp::Gte => doc! { "$gte": value },
            FieldOp::Lt => doc! { "$lt": value },
            FieldOp::Lte => doc! { "$lte": value },
            FieldOp::AnyOf | FieldOp::NoneOf => {
                if !matches!(value, Bson::Array(_)) {
                    return Err(DocumentStoreError::validation(format!(
                        "membership test on '{field}' requires an array operand"
                    )));
                }
                match op {
                    FieldOp::AnyOf => doc! { "$in": value },
                    _ => doc! { "$nin": value },
                }
            }
        };

        Ok(doc! { field: condition })
    }
}
