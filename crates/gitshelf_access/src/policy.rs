//! The per-collection, per-operation policy registry.

use crate::access::{Access, AccessContext};
use crate::auth::{AuthStrategy, Authenticator, Identity};
use crate::config::ApiConfig;
use crate::error::{AccessError, AccessResult};
use crate::middleware::{run_chain, Middleware, MiddlewareContext};
use crate::operation::Operation;
use crate::request::Request;
use gitshelf_core::Store;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Access entries and middleware chains of one collection.
#[derive(Clone, Default)]
pub struct CollectionPolicy {
    access: HashMap<Operation, Access>,
    middleware: HashMap<Operation, Vec<Arc<dyn Middleware>>>,
}

impl CollectionPolicy {
    /// Returns the access entry of `operation`, if exposed.
    pub fn access(&self, operation: Operation) -> Option<&Access> {
        self.access.get(&operation)
    }

    /// Returns the middleware chain of `operation`; empty if none.
    pub fn middleware(&self, operation: Operation) -> &[Arc<dyn Middleware>] {
        self.middleware
            .get(&operation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the exposed operations in declaration order.
    pub fn operations(&self) -> Vec<Operation> {
        Operation::ALL
            .into_iter()
            .filter(|op| self.access.contains_key(op))
            .collect()
    }
}

impl fmt::Debug for CollectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chains: HashMap<&Operation, usize> =
            self.middleware.iter().map(|(op, chain)| (op, chain.len())).collect();
        f.debug_struct("CollectionPolicy")
            .field("access", &self.access)
            .field("middleware", &chains)
            .finish()
    }
}

/// Everything needed to authenticate, transform and authorize requests.
///
/// Built from the [`ApiConfig`]; callables registered afterwards take
/// precedence: [`PolicyRegistry::set_access`] replaces the data rule of an
/// operation, [`PolicyRegistry::add_middleware`] appends to its chain.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    collections: HashMap<String, CollectionPolicy>,
    authenticator: Option<Authenticator>,
}

impl PolicyRegistry {
    /// Creates an empty registry: nothing is exposed, nobody authenticates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from a configuration.
    pub fn from_config(config: &ApiConfig) -> AccessResult<Self> {
        let mut registry = Self::new();
        for (name, collection) in config.normalize()? {
            let policy = registry.collections.entry(name).or_default();
            for (operation, rule) in collection.access {
                policy.access.insert(operation, Access::from(rule));
            }
            for (operation, chain) in collection.middleware {
                let chain = chain
                    .into_iter()
                    .map(|spec| Arc::new(spec) as Arc<dyn Middleware>)
                    .collect();
                policy.middleware.insert(operation, chain);
            }
        }
        registry.authenticator = config.authentication.as_ref().map(Authenticator::from_config);
        Ok(registry)
    }

    /// Sets the access entry of an operation, replacing any configured rule.
    pub fn set_access(&mut self, collection: &str, operation: Operation, access: Access) {
        self.policy_mut(collection).access.insert(operation, access);
    }

    /// Appends a middleware to the chain of an operation.
    pub fn add_middleware(
        &mut self,
        collection: &str,
        operation: Operation,
        middleware: Arc<dyn Middleware>,
    ) {
        self.policy_mut(collection)
            .middleware
            .entry(operation)
            .or_default()
            .push(middleware);
    }

    /// Replaces the whole chain of an operation.
    pub fn set_middleware(
        &mut self,
        collection: &str,
        operation: Operation,
        chain: Vec<Arc<dyn Middleware>>,
    ) {
        self.policy_mut(collection).middleware.insert(operation, chain);
    }

    /// Sets the authenticator.
    pub fn set_authenticator(&mut self, authenticator: Authenticator) {
        self.authenticator = Some(authenticator);
    }

    /// Appends a strategy to the authenticator.
    ///
    /// Fails if no authenticator is configured, since the strategy would
    /// have no identity collection to search.
    pub fn add_strategy(&mut self, strategy: Arc<dyn AuthStrategy>) -> AccessResult<()> {
        match &mut self.authenticator {
            Some(authenticator) => {
                authenticator.push(strategy);
                Ok(())
            }
            None => Err(AccessError::invalid_config(format!(
                "strategy {} registered without an authentication collection",
                strategy.name()
            ))),
        }
    }

    /// Returns the authenticator, if any.
    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_ref()
    }

    /// Returns the policy of a collection.
    pub fn collection(&self, name: &str) -> Option<&CollectionPolicy> {
        self.collections.get(name)
    }

    /// Returns true if `operation` has an access entry on `collection`.
    pub fn exposes(&self, collection: &str, operation: Operation) -> bool {
        self.collections
            .get(collection)
            .is_some_and(|policy| policy.access.contains_key(&operation))
    }

    /// Resolves the identity of a request against the identity collection.
    ///
    /// Without an authenticator every request is anonymous.
    pub fn resolve_identity(&self, store: &Store, request: &Request) -> AccessResult<Option<Identity>> {
        let Some(authenticator) = &self.authenticator else {
            return Ok(None);
        };
        let identities = store.collection(authenticator.collection())?;
        let candidates = identities.list();
        authenticator.resolve_identity(request, &candidates, identities.id_field())
    }

    /// Runs the middleware chain of the context's operation.
    pub fn apply_middleware(
        &self,
        ctx: &MiddlewareContext<'_>,
        document: Value,
    ) -> AccessResult<Value> {
        match self.collections.get(ctx.collection) {
            Some(policy) => run_chain(policy.middleware(ctx.operation), ctx, document),
            None => Ok(document),
        }
    }

    /// Checks the access entry of the context's operation.
    ///
    /// An operation without an entry is not exposed and never permitted.
    pub fn authorize(&self, ctx: &AccessContext<'_>) -> AccessResult<()> {
        let permitted = self
            .collections
            .get(ctx.collection)
            .and_then(|policy| policy.access(ctx.operation))
            .is_some_and(|access| access.permits(ctx));
        if permitted {
            Ok(())
        } else {
            debug!(
                collection = %ctx.collection,
                operation = %ctx.operation,
                identity = ?ctx.identity.map(|identity| identity.id.as_str()),
                "Access denied"
            );
            Err(AccessError::unauthorized(ctx.collection, ctx.operation))
        }
    }

    fn policy_mut(&mut self, collection: &str) -> &mut CollectionPolicy {
        self.collections.entry(collection.to_string()).or_default()
    }
}
