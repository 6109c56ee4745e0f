//! Operation names.

use crate::error::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator of combined configuration keys such as `"get|patch"`.
pub const KEY_SEPARATOR: char = '|';

/// One of the five operations a collection can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Read one item or list items.
    Get,
    /// Create an item.
    Post,
    /// Create or overwrite an item.
    Put,
    /// Merge fields into an existing item.
    Patch,
    /// Remove an item.
    Delete,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Operation; 5] = [
        Operation::Get,
        Operation::Post,
        Operation::Put,
        Operation::Patch,
        Operation::Delete,
    ];

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Post => "post",
            Operation::Put => "put",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
        }
    }

    /// Returns true for operations that change a collection.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Get)
    }

    /// Expands a possibly combined key into its operations.
    ///
    /// `"get|patch"` yields `[Get, Patch]`. Surrounding whitespace is
    /// ignored; empty parts and unknown names are errors.
    pub fn parse_keys(key: &str) -> AccessResult<Vec<Operation>> {
        key.split(KEY_SEPARATOR).map(|part| part.trim().parse()).collect()
    }
}

impl FromStr for Operation {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AccessError::UnknownOperation {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_and_combined_keys() {
        assert_eq!(Operation::parse_keys("get").unwrap(), vec![Operation::Get]);
        assert_eq!(
            Operation::parse_keys("get|patch").unwrap(),
            vec![Operation::Get, Operation::Patch]
        );
        assert_eq!(
            Operation::parse_keys("put | DELETE").unwrap(),
            vec![Operation::Put, Operation::Delete]
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            Operation::parse_keys("get|fetch"),
            Err(AccessError::UnknownOperation { name }) if name == "fetch"
        ));
        assert!(Operation::parse_keys("get|").is_err());
    }

    #[test]
    fn mutations() {
        assert!(!Operation::Get.is_mutation());
        assert!(Operation::ALL[1..].iter().all(Operation::is_mutation));
    }
}
