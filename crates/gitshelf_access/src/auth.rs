//! Authentication strategies and identity resolution.
//!
//! Identity documents live in an ordinary collection (for example `owners`).
//! Each strategy looks at the request and picks at most one of them; the
//! first strategy that matches decides the identity. No match means the
//! request is anonymous, which is not an error: denying it is the job of
//! the access rules.

use crate::error::{AccessError, AccessResult};
use crate::request::Request;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// The authenticated actor of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Identifier of the identity document.
    pub id: String,
    /// Name of the strategy that matched.
    pub strategy: String,
    /// The identity document itself.
    pub document: Value,
}

/// A way of picking an identity document for a request.
pub trait AuthStrategy: Send + Sync {
    /// Name used in logs, errors and `strategy` access rules.
    fn name(&self) -> &str;

    /// Returns the matching candidate, or `None`.
    fn authenticate(&self, request: &Request, candidates: &[Value]) -> AccessResult<Option<Value>>;
}

/// Where in the request a [`FieldMatch`] looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// A header, compared case-insensitively by name.
    Header,
    /// A query parameter.
    Query,
    /// A top-level string field of the body.
    Body,
}

/// Transformation applied to the extracted value before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Digest {
    /// Lowercase hex SHA-256.
    Sha256,
}

/// Declarative strategy: a request value must equal a candidate field.
///
/// ```json
/// { "name": "token", "location": "header", "key": "x-api-key",
///   "field": "token_hash", "digest": "sha256" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Strategy name.
    pub name: String,
    /// Where the value is read from.
    pub location: Location,
    /// Header name, query parameter or body field.
    pub key: String,
    /// Field of the candidate that must equal the value.
    pub field: String,
    /// Optional digest of the value before comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
}

impl FieldMatch {
    fn extract<'r>(&self, request: &'r Request) -> Option<&'r str> {
        let value = match self.location {
            Location::Header => request.header(&self.key),
            Location::Query => request.query.get(&self.key).map(String::as_str),
            Location::Body => request
                .body
                .as_ref()
                .and_then(|body| body.get(&self.key))
                .and_then(Value::as_str),
        };
        value.filter(|v| !v.is_empty())
    }
}

impl AuthStrategy for FieldMatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate(&self, request: &Request, candidates: &[Value]) -> AccessResult<Option<Value>> {
        let Some(raw) = self.extract(request) else {
            return Ok(None);
        };
        let expected = match self.digest {
            Some(Digest::Sha256) => sha256_hex(raw),
            None => raw.to_string(),
        };
        Ok(candidates
            .iter()
            .find(|candidate| {
                candidate.get(&self.field).and_then(Value::as_str) == Some(expected.as_str())
            })
            .cloned())
    }
}

fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// A strategy backed by a closure. Created with [`strategy_fn`].
pub struct StrategyFn<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for StrategyFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyFn").field("name", &self.name).finish()
    }
}

impl<F> AuthStrategy for StrategyFn<F>
where
    F: Fn(&Request, &[Value]) -> Result<Option<Value>, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate(&self, request: &Request, candidates: &[Value]) -> AccessResult<Option<Value>> {
        (self.f)(request, candidates).map_err(|message| AccessError::Authentication {
            strategy: self.name.clone(),
            message,
        })
    }
}

/// Wraps a closure as a named strategy.
///
/// An `Err` from the closure surfaces as [`AccessError::Authentication`].
pub fn strategy_fn<F>(name: impl Into<String>, f: F) -> StrategyFn<F>
where
    F: Fn(&Request, &[Value]) -> Result<Option<Value>, String> + Send + Sync,
{
    StrategyFn {
        name: name.into(),
        f,
    }
}

/// The `authentication` block of the API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    /// Collection holding the identity documents.
    pub collection: String,
    /// Strategies, tried in order.
    #[serde(default)]
    pub strategies: Vec<FieldMatch>,
}

/// Resolves the identity of a request from an ordered list of strategies.
#[derive(Clone)]
pub struct Authenticator {
    collection: String,
    strategies: Vec<Arc<dyn AuthStrategy>>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("Authenticator")
            .field("collection", &self.collection)
            .field("strategies", &names)
            .finish()
    }
}

impl Authenticator {
    /// Creates an authenticator over the identity documents of `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            strategies: Vec::new(),
        }
    }

    /// Builds an authenticator from its declarative configuration.
    pub fn from_config(config: &AuthenticationConfig) -> Self {
        let mut authenticator = Self::new(config.collection.clone());
        for strategy in &config.strategies {
            authenticator.push(Arc::new(strategy.clone()));
        }
        authenticator
    }

    /// Appends a strategy; it is tried after the existing ones.
    pub fn push(&mut self, strategy: Arc<dyn AuthStrategy>) {
        self.strategies.push(strategy);
    }

    /// Returns the collection holding identity documents.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the strategy names in evaluation order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves the identity of `request` among `candidates`.
    ///
    /// Strategies run in declaration order and the first match wins. A
    /// match without a string `id_field` is an authentication error.
    pub fn resolve_identity(
        &self,
        request: &Request,
        candidates: &[Value],
        id_field: &str,
    ) -> AccessResult<Option<Identity>> {
        for strategy in &self.strategies {
            let Some(document) = strategy.authenticate(request, candidates)? else {
                continue;
            };
            let id = document
                .get(id_field)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| AccessError::Authentication {
                    strategy: strategy.name().to_string(),
                    message: format!("matched identity has no string {id_field}"),
                })?;
            debug!(strategy = strategy.name(), identity = %id, "Resolved identity");
            return Ok(Some(Identity {
                id,
                strategy: strategy.name().to_string(),
                document,
            }));
        }
        Ok(None)
    }
}
