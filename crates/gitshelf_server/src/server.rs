//! The operation binding.
//!
//! Every call follows the same pipeline:
//!
//! ```text
//! identity -> middleware -> authorize -> mutate -> persist -> sync -> reload
//! ```
//!
//! Reads stop after authorization and never sync. Writes hold the store
//! exclusively for the whole pipeline, so a second write can never mutate
//! the collections while a sync cycle is persisting or reloading them.

use crate::config::ServerConfig;
use crate::error::{ErrorKind, ServerError, ServerResult};
use gitshelf_access::{
    filter_items, Access, AccessContext, AccessError, AccessPredicate, ApiConfig, AuthStrategy,
    Identity, Middleware, MiddlewareContext, Operation, PolicyRegistry, Request,
};
use gitshelf_core::{CoreError, Store};
use gitshelf_sync::{GitCli, ReplicaSync, Repository, ResolvedConflict, SyncReport};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

/// Outcome of a successful call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Identifier of the written item.
    pub id: Option<String>,
    /// Result of a read: one document, or an array for list reads.
    pub data: Option<Value>,
    /// Divergence resolved by the sync cycle that followed a write.
    ///
    /// When non-empty the write itself may have been discarded in favor of
    /// the remote history.
    pub conflicts: Vec<ResolvedConflict>,
}

impl Response {
    /// Returns [`ErrorKind::ConflictResolved`] if the call completed with a
    /// resolved conflict.
    pub fn warning(&self) -> Option<ErrorKind> {
        (!self.conflicts.is_empty()).then_some(ErrorKind::ConflictResolved)
    }
}

/// Builds a [`ShelfServer`], registering custom callables on the way.
///
/// Registered access predicates replace the configured rule of their
/// operation; registered middleware runs after the configured chain;
/// registered strategies run after the configured ones.
pub struct ServerBuilder<R: Repository> {
    config: ServerConfig,
    repository: R,
    access: Vec<(String, Operation, Access)>,
    middleware: Vec<(String, Operation, Arc<dyn Middleware>)>,
    strategies: Vec<Arc<dyn AuthStrategy>>,
}

impl ServerBuilder<GitCli> {
    /// Creates a builder backed by the `git` binary.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_repository(config, GitCli::new())
    }
}

impl<R: Repository> ServerBuilder<R> {
    /// Creates a builder backed by `repository`.
    pub fn with_repository(config: ServerConfig, repository: R) -> Self {
        Self {
            config,
            repository,
            access: Vec::new(),
            middleware: Vec::new(),
            strategies: Vec::new(),
        }
    }

    /// Registers an access predicate.
    #[must_use]
    pub fn access(
        mut self,
        collection: impl Into<String>,
        operation: Operation,
        predicate: impl AccessPredicate + 'static,
    ) -> Self {
        self.access
            .push((collection.into(), operation, Access::rule(predicate)));
        self
    }

    /// Permits an operation unconditionally.
    #[must_use]
    pub fn allow(mut self, collection: impl Into<String>, operation: Operation) -> Self {
        self.access.push((collection.into(), operation, Access::Always));
        self
    }

    /// Registers a middleware.
    #[must_use]
    pub fn middleware(
        mut self,
        collection: impl Into<String>,
        operation: Operation,
        middleware: impl Middleware + 'static,
    ) -> Self {
        self.middleware
            .push((collection.into(), operation, Arc::new(middleware)));
        self
    }

    /// Registers an authentication strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: impl AuthStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Brings the working copy up to date, loads the configuration and
    /// opens every collection.
    pub async fn build(self) -> ServerResult<ShelfServer<R>> {
        let replica = ReplicaSync::new(self.config.replica.clone(), self.repository);
        replica.ensure_local().await?;

        let root = self.config.root();
        let api = ApiConfig::load_from(&root, &self.config.api_file).await?;
        let mut registry = PolicyRegistry::from_config(&api)?;

        for (collection, operation, access) in self.access {
            require_collection(&api, &collection)?;
            registry.set_access(&collection, operation, access);
        }
        for (collection, operation, middleware) in self.middleware {
            require_collection(&api, &collection)?;
            registry.add_middleware(&collection, operation, middleware);
        }
        for strategy in self.strategies {
            registry.add_strategy(strategy)?;
        }

        let store = Store::open(&root, &api.collection_options()).await?;
        info!(root = %root.display(), "Server ready");

        Ok(ShelfServer {
            config: self.config,
            replica,
            registry,
            store: RwLock::new(store),
        })
    }
}

fn require_collection(api: &ApiConfig, collection: &str) -> ServerResult<()> {
    if api.collections.contains_key(collection) {
        Ok(())
    } else {
        Err(AccessError::invalid_config(format!(
            "callable registered for unknown collection {collection}"
        ))
        .into())
    }
}

/// Serves the five operations of every configured collection.
pub struct ShelfServer<R: Repository> {
    config: ServerConfig,
    replica: ReplicaSync<R>,
    registry: PolicyRegistry,
    store: RwLock<Store>,
}

/// A write, checked and ready to apply.
struct Prepared {
    id: String,
    document: Value,
    existing: Option<Value>,
}

impl<R: Repository> ShelfServer<R> {
    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the replica.
    pub fn replica(&self) -> &ReplicaSync<R> {
        &self.replica
    }

    /// Returns the policy registry.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Returns shared access to the store, bypassing access rules.
    pub async fn store(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().await
    }

    /// Dispatches a call.
    pub async fn call(
        &self,
        operation: Operation,
        collection: &str,
        request: Request,
    ) -> ServerResult<Response> {
        let result = match operation {
            Operation::Get => self.get(collection, request).await.map(|data| Response {
                data: Some(data),
                ..Response::default()
            }),
            Operation::Post => self.post(collection, request).await,
            Operation::Put => self.put(collection, request).await,
            Operation::Patch => self.patch(collection, request).await,
            Operation::Delete => self.delete(collection, request).await,
        };
        if let Err(e) = &result {
            if e.is_client_error() {
                debug!(%operation, collection, kind = %e.kind(), error = %e, "Call rejected");
            } else {
                warn!(%operation, collection, kind = %e.kind(), error = %e, "Call failed");
            }
        }
        result
    }

    /// Reads one item (`request.id`) or every visible item.
    ///
    /// List reads skip items the access rule denies and then apply the
    /// request's equality filter. Items are ordered by identifier.
    pub async fn get(&self, collection: &str, request: Request) -> ServerResult<Value> {
        let store = self.store.read().await;
        let identity = self.registry.resolve_identity(&store, &request)?;
        let target = store.collection(collection)?;
        let ctx = MiddlewareContext {
            store: &store,
            collection,
            operation: Operation::Get,
            identity: identity.as_ref(),
        };

        // Checked before lookup so a hidden collection does not reveal its ids.
        if !self.registry.exposes(collection, Operation::Get) {
            return Err(AccessError::unauthorized(collection, Operation::Get).into());
        }

        if let Some(id) = &request.id {
            let item = target
                .get(id)
                .ok_or_else(|| CoreError::not_found(collection, id.as_str()))?;
            return self.present(&ctx, item);
        }
        let id_field = target.id_field();
        let mut items = target.list();
        items.sort_by(|a, b| {
            let a = a.get(id_field).and_then(Value::as_str);
            let b = b.get(id_field).and_then(Value::as_str);
            a.cmp(&b)
        });

        let mut visible = Vec::with_capacity(items.len());
        for item in items {
            match self.present(&ctx, item) {
                Ok(document) => visible.push(document),
                Err(ServerError::Access(AccessError::Unauthorized { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Array(filter_items(visible, &request.filter)))
    }

    /// Creates an item.
    pub async fn post(&self, collection: &str, request: Request) -> ServerResult<Response> {
        self.write(Operation::Post, collection, request).await
    }

    /// Creates or overwrites an item.
    pub async fn put(&self, collection: &str, request: Request) -> ServerResult<Response> {
        self.write(Operation::Put, collection, request).await
    }

    /// Merges the body's fields into an existing item.
    pub async fn patch(&self, collection: &str, request: Request) -> ServerResult<Response> {
        self.write(Operation::Patch, collection, request).await
    }

    /// Removes an item. The identifier comes from `request.id`, or from the
    /// body's identifier field.
    pub async fn delete(&self, collection: &str, request: Request) -> ServerResult<Response> {
        self.write(Operation::Delete, collection, request).await
    }

    /// Runs a sync cycle outside of any write.
    pub async fn sync(&self) -> ServerResult<SyncReport> {
        let mut store = self.store.write().await;
        match self.replica.sync(&mut store).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(reload) = store.reload_all().await {
                    warn!(error = %reload, "Reload after failed sync failed");
                }
                Err(e.into())
            }
        }
    }

    fn present(&self, ctx: &MiddlewareContext<'_>, item: Value) -> ServerResult<Value> {
        let document = self.registry.apply_middleware(ctx, item.clone())?;
        self.registry.authorize(&AccessContext {
            collection: ctx.collection,
            operation: Operation::Get,
            document: &document,
            existing: Some(&item),
            identity: ctx.identity,
        })?;
        Ok(document)
    }

    async fn write(
        &self,
        operation: Operation,
        collection: &str,
        request: Request,
    ) -> ServerResult<Response> {
        let mut store = self.store.write().await;
        let identity = self.registry.resolve_identity(&store, &request)?;
        let prepared = prepare(&store, operation, collection, request)?;
        let document = self.transform(&store, operation, collection, identity.as_ref(), &prepared)?;

        let target = store.collection_mut(collection)?;
        let id = match operation {
            Operation::Post => target.create(document)?,
            Operation::Put => target.replace(document)?,
            Operation::Patch => target.merge(document)?,
            Operation::Delete => target.remove(&prepared.id)?,
            Operation::Get => {
                return Err(ServerError::invalid_request("get does not write"));
            }
        };
        debug!(%operation, collection, item = %id, "Applied write");

        match self.replica.sync(&mut store).await {
            Ok(report) => Ok(Response {
                id: Some(id),
                data: None,
                conflicts: report.conflicts,
            }),
            Err(e) => {
                // A reset may have rewritten any collection before the failure.
                if let Err(reload) = store.reload_all().await {
                    warn!(collection, error = %reload, "Reload after failed sync failed");
                }
                Err(e.into())
            }
        }
    }

    fn transform(
        &self,
        store: &Store,
        operation: Operation,
        collection: &str,
        identity: Option<&Identity>,
        prepared: &Prepared,
    ) -> ServerResult<Value> {
        let ctx = MiddlewareContext {
            store,
            collection,
            operation,
            identity,
        };
        let document = self
            .registry
            .apply_middleware(&ctx, prepared.document.clone())?;
        self.registry.authorize(&AccessContext {
            collection,
            operation,
            document: &document,
            existing: prepared.existing.as_ref(),
            identity,
        })?;
        Ok(document)
    }
}

/// Extracts the target identifier, the submitted document and the stored
/// item of a write.
fn prepare(
    store: &Store,
    operation: Operation,
    collection: &str,
    request: Request,
) -> ServerResult<Prepared> {
    let target = store.collection(collection)?;

    if operation == Operation::Delete {
        let id = match (request.id, &request.body) {
            (Some(id), _) => id,
            (None, Some(body)) => target.identifier_of(body)?,
            (None, None) => {
                return Err(CoreError::MissingIdentifier {
                    collection: collection.to_string(),
                    field: target.id_field().to_string(),
                }
                .into())
            }
        };
        let existing = target
            .get(&id)
            .ok_or_else(|| CoreError::not_found(collection, id.as_str()))?;
        return Ok(Prepared {
            id,
            document: existing.clone(),
            existing: Some(existing),
        });
    }

    let mut body = request.body.ok_or_else(|| {
        ServerError::invalid_request(format!("{operation} on {collection} requires a body"))
    })?;
    if let Some(id) = request.id {
        let Value::Object(fields) = &mut body else {
            return Err(ServerError::invalid_request("body must be a JSON object"));
        };
        let id_field = target.id_field();
        match fields.get(id_field) {
            None => {
                fields.insert(id_field.to_string(), Value::String(id));
            }
            Some(Value::String(given)) if *given == id => {}
            Some(given) => {
                return Err(ServerError::invalid_request(format!(
                    "body {id_field} {given} does not match the addressed item {id}"
                )));
            }
        }
    }

    let id = target.identifier_of(&body)?;
    let existing = match operation {
        Operation::Post => None,
        _ => target.get(&id),
    };
    if operation == Operation::Patch && existing.is_none() {
        return Err(CoreError::not_found(collection, id).into());
    }
    Ok(Prepared {
        id,
        document: body,
        existing,
    })
}
