//! Access predicates.

use crate::auth::Identity;
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Everything an access predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext<'a> {
    /// Collection being accessed.
    pub collection: &'a str,
    /// Requested operation.
    pub operation: Operation,
    /// The document after middleware: the submitted body for post, put and
    /// patch, the stored item for get and delete.
    pub document: &'a Value,
    /// The stored item the request targets, before middleware, if it exists.
    pub existing: Option<&'a Value>,
    /// The acting identity; `None` for anonymous requests.
    pub identity: Option<&'a Identity>,
}

impl<'a> AccessContext<'a> {
    /// The document whose ownership decides the request: the stored item
    /// when there is one, so a write cannot grant itself access.
    pub fn subject(&self) -> &'a Value {
        self.existing.unwrap_or(self.document)
    }
}

/// Decides whether an operation is permitted.
pub trait AccessPredicate: Send + Sync {
    /// Returns true to permit.
    fn permits(&self, ctx: &AccessContext<'_>) -> bool;
}

/// The access entry of one (collection, operation) pair.
#[derive(Clone)]
pub enum Access {
    /// Permit without looking at identity or document.
    Always,
    /// Ask the predicate.
    Rule(Arc<dyn AccessPredicate>),
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Always => f.write_str("Always"),
            Access::Rule(_) => f.write_str("Rule(..)"),
        }
    }
}

impl Access {
    /// Wraps a predicate.
    pub fn rule(predicate: impl AccessPredicate + 'static) -> Self {
        Access::Rule(Arc::new(predicate))
    }

    /// Evaluates the entry.
    pub fn permits(&self, ctx: &AccessContext<'_>) -> bool {
        match self {
            Access::Always => true,
            Access::Rule(predicate) => predicate.permits(ctx),
        }
    }
}

impl From<AccessRule> for Access {
    fn from(rule: AccessRule) -> Self {
        match rule {
            AccessRule::Constant(true) => Access::Always,
            rule => Access::rule(rule),
        }
    }
}

/// Keyword rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyword {
    /// Any identified request.
    Authenticated,
    /// Only anonymous requests.
    Anonymous,
}

/// Rules that inspect the identity or the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The identity id equals the field, or is an element of it.
    ListedIn(String),
    /// The identity id equals the field.
    IdentityMatches(String),
    /// The identity was produced by the named strategy.
    Strategy(String),
    /// At least one rule permits.
    Any(Vec<AccessRule>),
    /// Every rule permits.
    All(Vec<AccessRule>),
}

/// A declarative access rule.
///
/// ```json
/// true
/// "authenticated"
/// { "listed_in": "owners" }
/// { "any": [ { "identity_matches": "id" }, { "strategy": "admin" } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessRule {
    /// Always permit or always deny.
    Constant(bool),
    /// See [`Keyword`].
    Keyword(Keyword),
    /// See [`Condition`].
    Condition(Condition),
}

impl AccessPredicate for AccessRule {
    fn permits(&self, ctx: &AccessContext<'_>) -> bool {
        match self {
            AccessRule::Constant(permit) => *permit,
            AccessRule::Keyword(Keyword::Authenticated) => ctx.identity.is_some(),
            AccessRule::Keyword(Keyword::Anonymous) => ctx.identity.is_none(),
            AccessRule::Condition(condition) => condition.permits(ctx),
        }
    }
}

impl Condition {
    fn permits(&self, ctx: &AccessContext<'_>) -> bool {
        match self {
            Condition::ListedIn(field) => ctx.identity.is_some_and(|identity| {
                match ctx.subject().get(field) {
                    Some(Value::String(id)) => *id == identity.id,
                    Some(Value::Array(ids)) => {
                        ids.iter().any(|id| id.as_str() == Some(identity.id.as_str()))
                    }
                    _ => false,
                }
            }),
            Condition::IdentityMatches(field) => ctx.identity.is_some_and(|identity| {
                ctx.subject().get(field).and_then(Value::as_str) == Some(identity.id.as_str())
            }),
            Condition::Strategy(name) => ctx
                .identity
                .is_some_and(|identity| identity.strategy == *name),
            Condition::Any(rules) => rules.iter().any(|rule| rule.permits(ctx)),
            Condition::All(rules) => rules.iter().all(|rule| rule.permits(ctx)),
        }
    }
}

/// A predicate backed by a closure. Created with [`predicate_fn`].
pub struct PredicateFn<F>(F);

impl<F> AccessPredicate for PredicateFn<F>
where
    F: Fn(&AccessContext<'_>) -> bool + Send + Sync,
{
    fn permits(&self, ctx: &AccessContext<'_>) -> bool {
        (self.0)(ctx)
    }
}

/// Wraps a closure as an access predicate.
pub fn predicate_fn<F>(f: F) -> PredicateFn<F>
where
    F: Fn(&AccessContext<'_>) -> bool + Send + Sync,
{
    PredicateFn(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.into(),
            strategy: "owner".into(),
            document: json!({ "id": id }),
        }
    }

    fn ctx<'a>(
        operation: Operation,
        document: &'a Value,
        existing: Option<&'a Value>,
        identity: Option<&'a Identity>,
    ) -> AccessContext<'a> {
        AccessContext {
            collection: "pets",
            operation,
            document,
            existing,
            identity,
        }
    }

    fn rule(value: Value) -> AccessRule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn rules_deserialize_from_every_form() {
        assert_eq!(rule(json!(true)), AccessRule::Constant(true));
        assert_eq!(
            rule(json!("authenticated")),
            AccessRule::Keyword(Keyword::Authenticated)
        );
        assert_eq!(
            rule(json!({"listed_in": "owners"})),
            AccessRule::Condition(Condition::ListedIn("owners".into()))
        );
        assert_eq!(
            rule(json!({"any": [false, {"strategy": "admin"}]})),
            AccessRule::Condition(Condition::Any(vec![
                AccessRule::Constant(false),
                AccessRule::Condition(Condition::Strategy("admin".into())),
            ]))
        );
        assert!(serde_json::from_value::<AccessRule>(json!("sometimes")).is_err());
    }

    #[test]
    fn owners_may_patch_their_pet() {
        let taco = json!({"name": "Taco", "owners": ["annie"]});
        let patch = json!({"name": "Taco", "age": 2});
        let rule = rule(json!({"listed_in": "owners"}));
        let annie = identity("annie");
        let bobby = identity("bbrennan");

        assert!(rule.permits(&ctx(Operation::Patch, &patch, Some(&taco), Some(&annie))));
        assert!(!rule.permits(&ctx(Operation::Patch, &patch, Some(&taco), Some(&bobby))));
        assert!(!rule.permits(&ctx(Operation::Patch, &patch, Some(&taco), None)));
    }

    #[test]
    fn a_write_cannot_list_itself_as_owner() {
        let taco = json!({"name": "Taco", "owners": ["annie"]});
        let hijack = json!({"name": "Taco", "owners": ["bbrennan"]});
        let rule = rule(json!({"listed_in": "owners"}));
        let bobby = identity("bbrennan");

        assert!(!rule.permits(&ctx(Operation::Put, &hijack, Some(&taco), Some(&bobby))));
        // Without a stored item the submitted document decides.
        assert!(rule.permits(&ctx(Operation::Post, &hijack, None, Some(&bobby))));
    }

    #[test]
    fn listed_in_accepts_a_single_id() {
        let doc = json!({"owner": "annie"});
        let rule = rule(json!({"listed_in": "owner"}));
        assert!(rule.permits(&ctx(Operation::Delete, &doc, None, Some(&identity("annie")))));
    }

    #[test]
    fn identity_matches_and_keywords() {
        let annie_doc = json!({"id": "annie"});
        let annie = identity("annie");
        let bobby = identity("bbrennan");

        let own = rule(json!({"identity_matches": "id"}));
        assert!(own.permits(&ctx(Operation::Patch, &annie_doc, None, Some(&annie))));
        assert!(!own.permits(&ctx(Operation::Patch, &annie_doc, None, Some(&bobby))));

        let authenticated = rule(json!("authenticated"));
        assert!(authenticated.permits(&ctx(Operation::Get, &annie_doc, None, Some(&bobby))));
        assert!(!authenticated.permits(&ctx(Operation::Get, &annie_doc, None, None)));

        let anonymous = rule(json!("anonymous"));
        assert!(anonymous.permits(&ctx(Operation::Get, &annie_doc, None, None)));
    }

    #[test]
    fn combinators() {
        let doc = json!({"id": "annie"});
        let bobby = identity("bbrennan");
        let admin = Identity {
            strategy: "admin".into(),
            ..identity("root")
        };

        let rule = rule(json!({"any": [{"identity_matches": "id"}, {"strategy": "admin"}]}));
        assert!(rule.permits(&ctx(Operation::Delete, &doc, None, Some(&admin))));
        assert!(!rule.permits(&ctx(Operation::Delete, &doc, None, Some(&bobby))));

        let both = super::AccessRule::Condition(Condition::All(vec![
            AccessRule::Keyword(Keyword::Authenticated),
            AccessRule::Constant(false),
        ]));
        assert!(!both.permits(&ctx(Operation::Get, &doc, None, Some(&admin))));
    }

    #[test]
    fn always_short_circuits() {
        let doc = json!({});
        let access = Access::from(AccessRule::Constant(true));
        assert!(matches!(access, Access::Always));
        assert!(access.permits(&ctx(Operation::Get, &doc, None, None)));

        let denied = Access::from(AccessRule::Constant(false));
        assert!(!denied.permits(&ctx(Operation::Get, &doc, None, None)));
    }

    #[test]
    fn closures_as_predicates() {
        let doc = json!({"age": 3});
        let access = Access::rule(predicate_fn(|ctx: &AccessContext<'_>| {
            ctx.document["age"].as_i64().is_some_and(|age| age < 5)
        }));
        assert!(access.permits(&ctx(Operation::Post, &doc, None, None)));
    }
}
