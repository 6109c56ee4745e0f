//! # gitshelf access
//!
//! Identity resolution, access rules and middleware for gitshelf
//! collections.
//!
//! A request passes through three stages before it may touch a collection:
//!
//! 1. [`PolicyRegistry::resolve_identity`] runs the authentication
//!    strategies in order; no match means an anonymous request.
//! 2. [`PolicyRegistry::apply_middleware`] transforms the document.
//! 3. [`PolicyRegistry::authorize`] evaluates the access entry of the
//!    (collection, operation) pair.
//!
//! Rules, middleware and strategies are either declared in the
//! [`ApiConfig`] or registered as closures through [`predicate_fn`],
//! [`middleware_fn`] and [`strategy_fn`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod access;
mod auth;
mod config;
mod error;
mod middleware;
mod operation;
mod policy;
pub mod query;
mod request;

pub use access::{
    predicate_fn, Access, AccessContext, AccessPredicate, AccessRule, Condition, Keyword,
    PredicateFn,
};
pub use auth::{
    strategy_fn, AuthStrategy, AuthenticationConfig, Authenticator, Digest, FieldMatch, Identity,
    Location, StrategyFn,
};
pub use config::{ApiConfig, CollectionConfig, NormalizedCollection, API_FILE};
pub use error::{AccessError, AccessResult};
pub use middleware::{
    middleware_fn, run_chain, Middleware, MiddlewareContext, MiddlewareFn, MiddlewareSpec,
};
pub use operation::{Operation, KEY_SEPARATOR};
pub use policy::{CollectionPolicy, PolicyRegistry};
pub use query::{filter_items, matches_filter};
pub use request::Request;
