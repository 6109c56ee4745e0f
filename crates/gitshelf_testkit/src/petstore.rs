//! The petstore: two related collections used as the shared test scenario.
//!
//! `pets` are identified by `name` and list their owners by id; `owners`
//! authenticate through the `x-owner` header and carry a markdown `bio`
//! attachment. Reads expand `pets.owners` into owner documents and embed
//! each owner's pets.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// Directory inside the working copy that holds the collections.
pub const ROOT: &str = "gitshelf";

/// Header carrying the acting owner id.
pub const OWNER_HEADER: &str = "x-owner";

/// Taco the cat, owned by Annie.
pub fn taco() -> Value {
    json!({"name": "Taco", "owners": ["annie"], "age": 1, "type": "cat"})
}

/// Lucy the dog, owned by Bobby.
pub fn lucy() -> Value {
    json!({"name": "Lucy", "owners": ["bbrennan"], "age": 2, "type": "dog"})
}

/// Annie, owner of Taco.
pub fn annie() -> Value {
    json!({"id": "annie", "name": "Annie"})
}

/// Bobby, owner of Lucy.
pub fn bbrennan() -> Value {
    json!({"id": "bbrennan", "name": "Bobby"})
}

/// Taco as returned by a read: owners expanded into documents.
pub fn taco_full() -> Value {
    let mut taco = taco();
    taco["owners"] = json!([annie()]);
    taco
}

/// Annie as returned by a read: her pets embedded.
pub fn annie_full() -> Value {
    let mut annie = annie();
    annie["pets"] = json!([taco()]);
    annie
}

/// Schema of the `pets` collection.
pub fn pet_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "age": { "type": "number", "minimum": 0 },
            "type": { "type": "string", "enum": ["cat", "dog", "bird"] },
            "owners": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["owners"]
    })
}

/// The petstore `api.json`.
pub fn api_config() -> Value {
    json!({
        "authentication": {
            "collection": "owners",
            "strategies": [
                { "name": "owner", "location": "header", "key": OWNER_HEADER, "field": "id" }
            ]
        },
        "collections": {
            "pets": {
                "id": "name",
                "schema": pet_schema(),
                "access": {
                    "get|post": true,
                    "put|patch|delete": { "listed_in": "owners" }
                },
                "middleware": {
                    "get": [ { "expand": { "field": "owners", "collection": "owners", "omit": ["bio"] } } ]
                }
            },
            "owners": {
                "attachments": { "bio": "md" },
                "access": {
                    "get|post": true,
                    "put|patch|delete": { "identity_matches": "id" }
                },
                "middleware": {
                    "get": [ { "embed": { "field": "pets", "collection": "pets", "foreign_field": "owners" } } ]
                }
            }
        }
    })
}

/// Writes `api.json` into `dir` (normally `<working copy>/gitshelf`).
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_api_config(dir: &Path) {
    fs::create_dir_all(dir).expect("Failed to create config directory");
    let mut text = serde_json::to_string_pretty(&api_config()).expect("Failed to render api.json");
    text.push('\n');
    fs::write(dir.join("api.json"), text).expect("Failed to write api.json");
}

/// Path of an item's canonical file relative to the working copy.
pub fn item_path(collection: &str, id: &str) -> String {
    format!("{ROOT}/{collection}/{id}/_item.json")
}

/// Pretty-printed item file contents, as the store writes them.
pub fn item_file(document: &Value) -> String {
    let mut text = serde_json::to_string_pretty(document).unwrap_or_default();
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_documents_embed_plain_documents() {
        assert_eq!(taco_full()["owners"][0], annie());
        assert_eq!(annie_full()["pets"][0], taco());
        assert_eq!(taco_full()["name"], "Taco");
    }

    #[test]
    fn test_item_path() {
        assert_eq!(item_path("pets", "Taco"), "gitshelf/pets/Taco/_item.json");
        assert!(item_file(&lucy()).ends_with("}\n"));
    }
}
