//! Structural validation of documents.
//!
//! Schemas are written in a subset of JSON Schema:
//!
//! | Keyword | Applies to |
//! |---------|------------|
//! | `type` (string or list) | any value |
//! | `enum`, `const` | any value |
//! | `minimum`, `maximum` | numbers |
//! | `minLength`, `maxLength` | strings |
//! | `items`, `minItems`, `maxItems` | arrays |
//! | `properties`, `required`, `additionalProperties` | objects |
//!
//! Unknown keywords are ignored. Validation is a pure function of the
//! document and the schema and reports every violation it finds.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON-pointer style location of the offending value (`""` is the root).
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// Creates a violation at `path`.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "/: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A validated schema document.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    root: Value,
}

impl Schema {
    /// Creates a schema from its JSON representation.
    ///
    /// The root must be an object (or a boolean schema).
    pub fn new(root: Value) -> CoreResult<Self> {
        match &root {
            Value::Object(_) | Value::Bool(_) => Ok(Self { root }),
            other => Err(CoreError::InvalidSchema {
                message: format!("schema root must be an object, found {}", type_name(other)),
            }),
        }
    }

    /// Declares `field` as a required string property.
    ///
    /// Applied to every collection schema so that the identifier is always
    /// present and always a string, whatever the declared schema says.
    #[must_use]
    pub fn with_identifier(mut self, field: &str) -> Self {
        if self.root == Value::Bool(true) {
            self.root = Value::Object(Map::new());
        }
        if let Value::Object(root) = &mut self.root {
            let properties = root
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if !properties.is_object() {
                *properties = Value::Object(Map::new());
            }
            if let Value::Object(properties) = properties {
                properties.insert(field.to_string(), serde_json::json!({ "type": "string" }));
            }

            let required = root
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if !required.is_array() {
                *required = Value::Array(Vec::new());
            }
            if let Value::Array(required) = required {
                if !required.iter().any(|name| name.as_str() == Some(field)) {
                    required.push(Value::String(field.to_string()));
                }
            }
        }
        self
    }

    /// Returns the JSON representation of the schema.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Validates `document`, returning every violation found.
    pub fn validate(&self, document: &Value) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        validate_node(&self.root, document, "", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn validate_node(schema: &Value, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let keywords = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            out.push(Violation::new(path, "no value is allowed here"));
            return;
        }
        Value::Object(keywords) => keywords,
        _ => return,
    };

    if let Some(expected) = keywords.get("type") {
        let names: Vec<&str> = match expected {
            Value::String(name) => vec![name.as_str()],
            Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !names.is_empty() && !names.iter().any(|name| matches_type(name, value)) {
            out.push(Violation::new(
                path,
                format!("expected {}, found {}", names.join(" or "), type_name(value)),
            ));
            // Remaining keywords would only restate the type mismatch.
            return;
        }
    }

    if let Some(Value::Array(allowed)) = keywords.get("enum") {
        if !allowed.contains(value) {
            out.push(Violation::new(path, "value is not one of the allowed values"));
        }
    }

    if let Some(expected) = keywords.get("const") {
        if expected != value {
            out.push(Violation::new(path, format!("expected constant {expected}")));
        }
    }

    match value {
        Value::Number(number) => {
            let n = number.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = keywords.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    out.push(Violation::new(path, format!("{n} is less than minimum {min}")));
                }
            }
            if let Some(max) = keywords.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    out.push(Violation::new(path, format!("{n} is greater than maximum {max}")));
                }
            }
        }
        Value::String(text) => {
            let len = text.chars().count() as u64;
            if let Some(min) = keywords.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    out.push(Violation::new(path, format!("shorter than {min} characters")));
                }
            }
            if let Some(max) = keywords.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    out.push(Violation::new(path, format!("longer than {max} characters")));
                }
            }
        }
        Value::Array(elements) => {
            let len = elements.len() as u64;
            if let Some(min) = keywords.get("minItems").and_then(Value::as_u64) {
                if len < min {
                    out.push(Violation::new(path, format!("fewer than {min} items")));
                }
            }
            if let Some(max) = keywords.get("maxItems").and_then(Value::as_u64) {
                if len > max {
                    out.push(Violation::new(path, format!("more than {max} items")));
                }
            }
            if let Some(item_schema) = keywords.get("items") {
                for (index, element) in elements.iter().enumerate() {
                    validate_node(item_schema, element, &format!("{path}/{index}"), out);
                }
            }
        }
        Value::Object(fields) => validate_object(keywords, fields, path, out),
        Value::Null | Value::Bool(_) => {}
    }
}

fn validate_object(
    keywords: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) {
    if let Some(Value::Array(required)) = keywords.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                out.push(Violation::new(path, format!("missing required field {name}")));
            }
        }
    }

    let properties = keywords.get("properties").and_then(Value::as_object);
    for (name, field) in fields {
        let field_path = format!("{path}/{}", escape_pointer(name));
        match properties.and_then(|p| p.get(name)) {
            Some(field_schema) => validate_node(field_schema, field, &field_path, out),
            None => match keywords.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    out.push(Violation::new(path, format!("undeclared field {name}")));
                }
                Some(extra @ Value::Object(_)) => validate_node(extra, field, &field_path, out),
                _ => {}
            },
        }
    }
}

fn matches_type(name: &str, value: &Value) -> bool {
    match name {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
