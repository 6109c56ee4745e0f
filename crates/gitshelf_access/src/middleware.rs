//! Document-transforming middleware.
//!
//! Middleware runs after identity resolution and before authorization. It
//! receives an owned document and returns the transformed one; an error
//! rejects the request before any collection is touched.

use crate::auth::Identity;
use crate::error::{AccessError, AccessResult};
use crate::operation::Operation;
use gitshelf_core::Store;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// What a middleware may look at besides the document.
#[derive(Clone, Copy)]
pub struct MiddlewareContext<'a> {
    /// Read access to every collection.
    pub store: &'a Store,
    /// Collection the request targets.
    pub collection: &'a str,
    /// Requested operation.
    pub operation: Operation,
    /// The acting identity, if any.
    pub identity: Option<&'a Identity>,
}

impl fmt::Debug for MiddlewareContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("collection", &self.collection)
            .field("operation", &self.operation)
            .field("identity", &self.identity.map(|identity| &identity.id))
            .finish()
    }
}

/// A document transform.
pub trait Middleware: Send + Sync {
    /// Transforms `document`.
    fn apply(&self, ctx: &MiddlewareContext<'_>, document: Value) -> AccessResult<Value>;
}

/// Declarative middleware.
///
/// ```json
/// { "strip": ["password"] }
/// { "defaults": { "type": "cat" } }
/// { "expand": { "field": "owners", "collection": "owners", "omit": ["bio"] } }
/// { "embed": { "field": "pets", "collection": "pets", "foreign_field": "owners" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareSpec {
    /// Removes the listed fields.
    Strip(Vec<String>),
    /// Inserts the given fields where absent.
    Defaults(Map<String, Value>),
    /// Replaces an identifier (or list of identifiers) with the referenced
    /// documents. Unknown identifiers are left as they are.
    Expand {
        /// Field holding the identifiers.
        field: String,
        /// Collection the identifiers point into.
        collection: String,
        /// Fields removed from each embedded document.
        #[serde(default)]
        omit: Vec<String>,
    },
    /// Sets `field` to every document of `collection` whose `foreign_field`
    /// names this document, sorted by their identifier.
    Embed {
        /// Field to set.
        field: String,
        /// Collection to search.
        collection: String,
        /// Field of the foreign documents holding an identifier or a list.
        foreign_field: String,
        /// Fields removed from each embedded document.
        #[serde(default)]
        omit: Vec<String>,
    },
}

impl Middleware for MiddlewareSpec {
    fn apply(&self, ctx: &MiddlewareContext<'_>, document: Value) -> AccessResult<Value> {
        let Value::Object(mut fields) = document else {
            return Err(AccessError::middleware(
                ctx.collection,
                "document is not a JSON object",
            ));
        };

        match self {
            MiddlewareSpec::Strip(names) => {
                for name in names {
                    fields.remove(name);
                }
            }
            MiddlewareSpec::Defaults(defaults) => {
                for (name, value) in defaults {
                    fields.entry(name.clone()).or_insert_with(|| value.clone());
                }
            }
            MiddlewareSpec::Expand {
                field,
                collection,
                omit,
            } => {
                let target = ctx.store.collection(collection)?;
                if let Some(value) = fields.get_mut(field) {
                    let lookup = |id: &Value| match id.as_str().and_then(|id| target.get(id)) {
                        Some(found) => without(found, omit),
                        None => id.clone(),
                    };
                    let expanded = match &*value {
                        Value::Array(ids) => Value::Array(ids.iter().map(lookup).collect()),
                        single => lookup(single),
                    };
                    *value = expanded;
                }
            }
            MiddlewareSpec::Embed {
                field,
                collection,
                foreign_field,
                omit,
            } => {
                let own_id_field = ctx.store.collection(ctx.collection)?.id_field().to_string();
                let Some(own_id) = fields.get(&own_id_field).and_then(Value::as_str) else {
                    return Err(AccessError::middleware(
                        ctx.collection,
                        format!("cannot embed {field}: document has no string {own_id_field}"),
                    ));
                };
                let foreign = ctx.store.collection(collection)?;
                let mut related: Vec<Value> = foreign
                    .list()
                    .into_iter()
                    .filter(|item| refers_to(item.get(foreign_field), own_id))
                    .collect();
                let foreign_id = foreign.id_field();
                related.sort_by(|a, b| {
                    let key = |v: &Value| {
                        v.get(foreign_id).and_then(Value::as_str).map(str::to_owned)
                    };
                    key(a).cmp(&key(b))
                });
                let related = related.into_iter().map(|item| without(item, omit)).collect();
                fields.insert(field.clone(), Value::Array(related));
            }
        }

        Ok(Value::Object(fields))
    }
}

fn refers_to(value: Option<&Value>, id: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == id,
        Some(Value::Array(values)) => values.iter().any(|v| v.as_str() == Some(id)),
        _ => false,
    }
}

fn without(mut document: Value, omit: &[String]) -> Value {
    if let Value::Object(fields) = &mut document {
        for name in omit {
            fields.remove(name);
        }
    }
    document
}

/// A middleware backed by a closure. Created with [`middleware_fn`].
pub struct MiddlewareFn<F>(F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(&MiddlewareContext<'_>, Value) -> Result<Value, String> + Send + Sync,
{
    fn apply(&self, ctx: &MiddlewareContext<'_>, document: Value) -> AccessResult<Value> {
        (self.0)(ctx, document).map_err(|message| AccessError::middleware(ctx.collection, message))
    }
}

/// Wraps a closure as middleware. An `Err` rejects the request with
/// [`AccessError::Middleware`].
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F>
where
    F: Fn(&MiddlewareContext<'_>, Value) -> Result<Value, String> + Send + Sync,
{
    MiddlewareFn(f)
}

/// Runs a middleware chain in order, stopping at the first failure.
pub fn run_chain(
    chain: &[Arc<dyn Middleware>],
    ctx: &MiddlewareContext<'_>,
    document: Value,
) -> AccessResult<Value> {
    chain
        .iter()
        .try_fold(document, |document, middleware| middleware.apply(ctx, document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitshelf_core::CollectionOptions;
    use gitshelf_testkit::petstore;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn petstore_store(dir: &TempDir) -> Store {
        let mut options = BTreeMap::new();
        options.insert("pets".into(), CollectionOptions::new().with_id_field("name"));
        options.insert("owners".into(), CollectionOptions::new());
        let mut store = Store::open(dir.path(), &options).await.unwrap();

        let pets = store.collection_mut("pets").unwrap();
        pets.create(petstore::taco()).unwrap();
        pets.create(petstore::lucy()).unwrap();
        let owners = store.collection_mut("owners").unwrap();
        owners.create(petstore::annie()).unwrap();
        owners
            .create(json!({"id": "bbrennan", "name": "Bobby", "password": "hunter2"}))
            .unwrap();
        store
    }

    fn ctx<'a>(store: &'a Store, collection: &'a str) -> MiddlewareContext<'a> {
        MiddlewareContext {
            store,
            collection,
            operation: Operation::Get,
            identity: None,
        }
    }

    fn spec(value: Value) -> MiddlewareSpec {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn expand_replaces_ids_with_documents() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let expand = spec(json!({"expand": {"field": "owners", "collection": "owners"}}));

        let taco = expand.apply(&ctx(&store, "pets"), petstore::taco()).unwrap();
        assert_eq!(taco, petstore::taco_full());
    }

    #[tokio::test]
    async fn expand_keeps_unknown_ids_and_omits_fields() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let expand = spec(json!({
            "expand": {"field": "owners", "collection": "owners", "omit": ["password"]}
        }));

        let pet = json!({"name": "Rex", "owners": ["bbrennan", "ghost"]});
        let expanded = expand.apply(&ctx(&store, "pets"), pet).unwrap();
        assert_eq!(
            expanded["owners"],
            json!([{"id": "bbrennan", "name": "Bobby"}, "ghost"])
        );

        let single = json!({"name": "Rex", "owners": "annie"});
        let expanded = expand.apply(&ctx(&store, "pets"), single).unwrap();
        assert_eq!(expanded["owners"], petstore::annie());
    }

    #[tokio::test]
    async fn embed_collects_the_reverse_relation() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let embed = spec(json!({
            "embed": {"field": "pets", "collection": "pets", "foreign_field": "owners"}
        }));

        let annie = embed.apply(&ctx(&store, "owners"), petstore::annie()).unwrap();
        assert_eq!(annie, petstore::annie_full());

        let nobody = embed
            .apply(&ctx(&store, "owners"), json!({"id": "carol"}))
            .unwrap();
        assert_eq!(nobody["pets"], json!([]));
    }

    #[tokio::test]
    async fn embed_requires_an_identifier() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let embed = spec(json!({
            "embed": {"field": "pets", "collection": "pets", "foreign_field": "owners"}
        }));

        let err = embed
            .apply(&ctx(&store, "owners"), json!({"name": "anonymous"}))
            .unwrap_err();
        assert!(matches!(err, AccessError::Middleware { .. }));
    }

    #[tokio::test]
    async fn unknown_collection_is_a_store_error() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let expand = spec(json!({"expand": {"field": "owners", "collection": "people"}}));

        let err = expand
            .apply(&ctx(&store, "pets"), petstore::taco())
            .unwrap_err();
        assert!(matches!(err, AccessError::Core(_)));
    }

    #[tokio::test]
    async fn chain_runs_in_order() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(spec(json!({"strip": ["password"]}))),
            Arc::new(spec(json!({"defaults": {"type": "cat", "age": 0}}))),
            Arc::new(middleware_fn(|_: &MiddlewareContext<'_>, mut doc: Value| {
                doc["age"] = json!(doc["age"].as_i64().unwrap_or(0) + 1);
                Ok(doc)
            })),
        ];

        let doc = json!({"name": "Rex", "age": 4, "password": "x"});
        let out = run_chain(&chain, &ctx(&store, "pets"), doc).unwrap();
        assert_eq!(out, json!({"name": "Rex", "age": 5, "type": "cat"}));
    }

    #[tokio::test]
    async fn failing_closure_stops_the_chain() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(middleware_fn(|_: &MiddlewareContext<'_>, _: Value| {
                Err("too many pets".to_string())
            })),
            Arc::new(middleware_fn(|_: &MiddlewareContext<'_>, _: Value| {
                panic!("must not run")
            })),
        ];

        match run_chain(&chain, &ctx(&store, "pets"), petstore::taco()) {
            Err(AccessError::Middleware {
                collection,
                message,
            }) => {
                assert_eq!(collection, "pets");
                assert_eq!(message, "too many pets");
            }
            other => panic!("expected middleware error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_objects_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = petstore_store(&dir).await;
        let strip = spec(json!({"strip": ["a"]}));
        assert!(strip.apply(&ctx(&store, "pets"), json!([1, 2])).is_err());
    }
}
