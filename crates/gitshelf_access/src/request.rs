//! Transport-neutral request shape.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A request as handed over by the routing layer.
///
/// `query`, `headers` and `body` are what authentication strategies
/// inspect. `filter` is the flat equality filter applied to list reads; it
/// is kept apart from `query` so credentials passed as query parameters
/// never filter results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Target item, for single-item operations.
    pub id: Option<String>,
    /// Submitted document.
    pub body: Option<Value>,
    /// Query parameters.
    pub query: BTreeMap<String, String>,
    /// Headers. Lookups through [`Request::header`] ignore case.
    pub headers: BTreeMap<String, String>,
    /// Equality filter for list reads.
    pub filter: Map<String, Value>,
}

impl Request {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets the item with this identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the submitted document.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Adds a header. The name is stored lowercase.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Adds an equality filter term.
    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filter.insert(field.into(), value);
        self
    }

    /// Returns a header value, comparing names case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
