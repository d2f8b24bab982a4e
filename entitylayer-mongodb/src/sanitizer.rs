//! Key escaping for MongoDB compatibility.
//!
//! MongoDB reserves dots and dollar signs in field names for path and operator
//! syntax. Entity payloads may carry arbitrary map keys, so nested keys are
//! escaped on the way in and restored on the way out. Values are left untouched.

use bson::{Bson, Document};

/// Escapes and restores document keys that MongoDB would reject or misread.
///
/// - Dots (`.`) - used for nested field access in queries
/// - Dollar signs (`$`) - used for operators in queries
/// - Null bytes (`\0`) - field name terminators
pub(crate) struct ValueSanitizer;

impl ValueSanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Recursively escapes every key of every document inside `value`.
    pub(crate) fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_document(doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (Self::sanitize_key(k), Self::sanitize_value(v)))
            .collect()
    }

    pub(crate) fn sanitize_key(input: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .fold(input.to_string(), |key, (target, replacement)| key.replace(target, replacement))
    }

    /// Inverse of [`ValueSanitizer::sanitize_value`].
    pub(crate) fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn restore_document(doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (Self::restore_key(k), Self::restore_value(v)))
            .collect()
    }

    pub(crate) fn restore_key(input: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .rev()
            .fold(input.to_string(), |key, (target, replacement)| key.replace(replacement, target))
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn nested_keys_are_escaped_and_restored() {
        let original = doc! {
            "name": "a.b$c",
            "attributes": { "price.eur": 10, "$tag": [ { "x.y": 1 } ] },
        };

        let sanitized = ValueSanitizer::sanitize_document(&original);
        let attributes = sanitized.get_document("attributes").unwrap();

        assert!(attributes.contains_key("price__dot__eur"));
        assert!(attributes.contains_key("__dollar__tag"));
        assert_eq!(sanitized.get_str("name").unwrap(), "a.b$c");
        assert_eq!(ValueSanitizer::restore_document(&sanitized), original);
    }
}
