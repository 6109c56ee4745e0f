//! The API configuration: collections, access rules, middleware and
//! authentication, as data.
//!
//! The configuration lives in the working copy next to the collections:
//!
//! ```text
//! <root>/
//! ├─ api.json       # authentication block and every collection
//! ├─ pets.json      # optional: replaces the "pets" entry of api.json
//! └─ pets/          # collection data
//! ```
//!
//! Access and middleware maps are keyed by operation name. A combined key
//! such as `"get|patch"` applies to each listed operation; [`ApiConfig::normalize`]
//! expands it once so nothing downstream ever splits keys.

use crate::access::AccessRule;
use crate::auth::AuthenticationConfig;
use crate::error::{AccessError, AccessResult};
use crate::middleware::MiddlewareSpec;
use crate::operation::Operation;
use gitshelf_core::CollectionOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Default name of the configuration file inside the store root.
pub const API_FILE: &str = "api.json";

const CONFIG_EXTENSION: &str = "json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Where identities come from and how requests are matched to them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationConfig>,
    /// Collections by name.
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

/// Configuration of one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Identifier field, schema and attachments.
    #[serde(flatten)]
    pub options: CollectionOptions,
    /// Access rules keyed by operation or combined key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub access: BTreeMap<String, AccessRule>,
    /// Middleware chains keyed by operation or combined key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middleware: BTreeMap<String, Vec<MiddlewareSpec>>,
}

/// A collection configuration with one entry per operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedCollection {
    /// Identifier field, schema and attachments.
    pub options: CollectionOptions,
    /// Access rule of each exposed operation.
    pub access: BTreeMap<Operation, AccessRule>,
    /// Middleware chain of each operation that has one.
    pub middleware: BTreeMap<Operation, Vec<MiddlewareSpec>>,
}

impl ApiConfig {
    /// Parses a configuration document.
    pub fn from_value(value: Value) -> AccessResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> AccessResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads `api.json` and the per-collection files from `root`.
    pub async fn load(root: &Path) -> AccessResult<Self> {
        Self::load_from(root, API_FILE).await
    }

    /// Loads `api_file` and the per-collection files from `root`.
    ///
    /// Every other `<name>.json` file directly under `root` replaces (or
    /// adds) the entry of collection `<name>`.
    pub async fn load_from(root: &Path, api_file: &str) -> AccessResult<Self> {
        let path = root.join(api_file);
        let text = fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AccessError::invalid_config(format!("{} not found", path.display()))
            } else {
                AccessError::Io(e)
            }
        })?;
        let mut config = Self::parse(&text)?;

        let mut entries = fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name == api_file || !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = file_name
                .strip_suffix(CONFIG_EXTENSION)
                .and_then(|stem| stem.strip_suffix('.'))
                .filter(|name| !name.is_empty() && !name.starts_with('.'))
            else {
                continue;
            };
            let text = fs::read_to_string(entry.path()).await?;
            let collection: CollectionConfig = serde_json::from_str(&text).map_err(|e| {
                AccessError::invalid_config(format!("{file_name}: {e}"))
            })?;
            debug!(collection = %name, file = %file_name, "Collection configuration override");
            config.collections.insert(name.to_string(), collection);
        }

        info!(
            root = %root.display(),
            collections = config.collections.len(),
            "Loaded API configuration"
        );
        Ok(config)
    }

    /// Returns the collection options, ready for `Store::open`.
    pub fn collection_options(&self) -> BTreeMap<String, CollectionOptions> {
        self.collections
            .iter()
            .map(|(name, config)| (name.clone(), config.options.clone()))
            .collect()
    }

    /// Expands combined keys and checks cross references.
    ///
    /// A single-operation key overrides a combined key naming the same
    /// operation. Two combined keys naming the same operation are
    /// ambiguous and rejected, as are references to unknown collections.
    pub fn normalize(&self) -> AccessResult<BTreeMap<String, NormalizedCollection>> {
        if let Some(auth) = &self.authentication {
            self.require_collection(&auth.collection, "authentication")?;
        }

        let mut normalized = BTreeMap::new();
        for (name, config) in &self.collections {
            for chain in config.middleware.values() {
                for spec in chain {
                    match spec {
                        MiddlewareSpec::Expand { collection, .. }
                        | MiddlewareSpec::Embed { collection, .. } => {
                            self.require_collection(collection, name)?;
                        }
                        MiddlewareSpec::Strip(_) | MiddlewareSpec::Defaults(_) => {}
                    }
                }
            }

            normalized.insert(
                name.clone(),
                NormalizedCollection {
                    options: config.options.clone(),
                    access: expand_keys(name, &config.access)?,
                    middleware: expand_keys(name, &config.middleware)?,
                },
            );
        }
        Ok(normalized)
    }

    fn require_collection(&self, name: &str, referenced_by: &str) -> AccessResult<()> {
        if self.collections.contains_key(name) {
            Ok(())
        } else {
            Err(AccessError::invalid_config(format!(
                "{referenced_by} references unknown collection {name}"
            )))
        }
    }
}

fn expand_keys<T: Clone>(
    collection: &str,
    entries: &BTreeMap<String, T>,
) -> AccessResult<BTreeMap<Operation, T>> {
    // operation -> (key it came from, whether that key named it alone)
    let mut sources: BTreeMap<Operation, (&str, bool)> = BTreeMap::new();
    let mut expanded = BTreeMap::new();

    for (key, value) in entries {
        let operations = Operation::parse_keys(key)?;
        let single = operations.len() == 1;
        for operation in operations {
            match sources.get(&operation) {
                Some((previous, _)) if *previous == key.as_str() => continue,
                Some((_, true)) if !single => continue,
                Some((previous, previous_single)) if *previous_single == single => {
                    return Err(AccessError::invalid_config(format!(
                        "{operation} on {collection} is configured by both \"{previous}\" and \"{key}\""
                    )));
                }
                _ => {}
            }
            sources.insert(operation, (key.as_str(), single));
            expanded.insert(operation, value.clone());
        }
    }
    Ok(expanded)
}
