//! Property-based test generators using proptest.
//!
//! Generated documents stay within what survives a JSON round trip exactly:
//! no floats, no NaN, identifiers that are valid single path components.

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating identifiers usable as file names.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,9}").expect("Invalid regex")
}

/// Strategy for generating scalar JSON values.
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for generating JSON values nested up to three levels deep.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for generating a document carrying `id_field`.
///
/// Extra fields never collide with the identifier field.
pub fn document_strategy(id_field: &str) -> impl Strategy<Value = Value> {
    let id_field = id_field.to_string();
    (
        identifier_strategy(),
        prop::collection::btree_map(field_name_strategy(), json_value_strategy(), 0..6),
    )
        .prop_map(move |(id, fields)| {
            let mut document: Map<String, Value> = fields
                .into_iter()
                .filter(|(name, _)| *name != id_field)
                .collect();
            document.insert(id_field.clone(), Value::String(id));
            Value::Object(document)
        })
}

/// Strategy for generating attachment text, including multi-line content.
pub fn attachment_text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[ -~]{0,40}", 0..6).prop_map(|lines| lines.join("\n"))
}

/// Strategy for generating a flat equality filter over scalar values.
pub fn filter_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(field_name_strategy(), json_leaf_strategy(), 0..3)
        .prop_map(|fields| fields.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_documents_carry_string_identifier(doc in document_strategy("name")) {
            prop_assert!(doc["name"].is_string());
            let id = doc["name"].as_str().unwrap_or_default();
            prop_assert!(!id.is_empty());
            prop_assert!(!id.starts_with('.'));
        }

        #[test]
        fn test_documents_round_trip_through_text(doc in document_strategy("id")) {
            let text = serde_json::to_string_pretty(&doc).unwrap();
            let parsed: Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(parsed, doc);
        }
    }
}
