//! Flat equality filtering of list reads.

use serde_json::{Map, Value};

/// Returns true if every filter term equals the item's field exactly.
///
/// A missing field never matches, not even a `null` term. Values compare
/// structurally with no coercion: `"1"` does not match `1`.
pub fn matches_filter(item: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| item.get(field) == Some(expected))
}

/// Keeps the items matching `filter`, in their original order.
pub fn filter_items(items: Vec<Value>, filter: &Map<String, Value>) -> Vec<Value> {
    if filter.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| matches_filter(item, filter))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitshelf_testkit::filter_strategy;
    use gitshelf_testkit::petstore::{lucy, taco};
    use proptest::prelude::*;
    use serde_json::json;

    fn filter(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn filter_by_type_returns_only_cats() {
        let items = vec![taco(), lucy()];
        let cats = filter_items(items, &filter(json!({"type": "cat"})));
        assert_eq!(cats, vec![taco()]);
    }

    #[test]
    fn no_coercion_and_no_partial_matches() {
        assert!(!matches_filter(&taco(), &filter(json!({"age": "1"}))));
        assert!(!matches_filter(&taco(), &filter(json!({"name": "Tac"}))));
        assert!(!matches_filter(&taco(), &filter(json!({"owners": "annie"}))));
        assert!(matches_filter(&taco(), &filter(json!({"owners": ["annie"]}))));
    }

    #[test]
    fn missing_field_never_matches() {
        assert!(!matches_filter(&json!({"a": 1}), &filter(json!({"b": null}))));
        assert!(matches_filter(&json!({"b": null}), &filter(json!({"b": null}))));
    }

    #[test]
    fn every_term_must_match() {
        let f = filter(json!({"type": "cat", "age": 2}));
        assert!(!matches_filter(&taco(), &f));
        assert!(filter_items(vec![taco(), lucy()], &f).is_empty());
    }

    proptest! {
        #[test]
        fn empty_filter_keeps_everything(n in 0usize..8) {
            let items: Vec<Value> = (0..n).map(|i| json!({"n": i})).collect();
            prop_assert_eq!(filter_items(items.clone(), &Map::new()), items);
        }

        #[test]
        fn an_item_matches_its_own_fields(filter in filter_strategy()) {
            let item = Value::Object(filter.clone());
            prop_assert!(matches_filter(&item, &filter));
        }
    }
}
