//! The set of live collections under one working-copy root.

use crate::collection::{Collection, CollectionOptions};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::info;

/// Owns every collection of a working copy.
///
/// A `Store` is the context object handed to whichever component needs the
/// collections: the server mutates through it, middleware reads through it
/// and the sync layer persists and reloads it.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    collections: BTreeMap<String, Collection>,
}

impl Store {
    /// Opens every configured collection under `root`, in parallel.
    ///
    /// Collection `name` lives in `<root>/<name>`. The first collection that
    /// fails to load aborts the open.
    pub async fn open(
        root: impl Into<PathBuf>,
        options: &BTreeMap<String, CollectionOptions>,
    ) -> CoreResult<Self> {
        let root = root.into();

        let mut opens = JoinSet::new();
        for (name, opts) in options {
            if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
                return Err(CoreError::InvalidIdentifier {
                    collection: name.clone(),
                    id: name.clone(),
                    reason: "collection names must be single path components".into(),
                });
            }
            let name = name.clone();
            let dir = root.join(&name);
            let opts = opts.clone();
            opens.spawn(async move { Collection::open(name, dir, &opts).await });
        }

        let mut collections = BTreeMap::new();
        while let Some(joined) = opens.join_next().await {
            let collection = joined??;
            collections.insert(collection.name().to_string(), collection);
        }

        info!(root = %root.display(), collections = collections.len(), "Opened store");
        Ok(Self { root, collections })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the named collection.
    pub fn collection(&self, name: &str) -> CoreResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| CoreError::UnknownCollection {
                name: name.to_string(),
            })
    }

    /// Returns the named collection for mutation.
    pub fn collection_mut(&mut self, name: &str) -> CoreResult<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownCollection {
                name: name.to_string(),
            })
    }

    /// Iterates over collection names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Iterates over the collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Returns true if any collection has unpersisted mutations.
    pub fn has_pending(&self) -> bool {
        self.collections.values().any(Collection::has_pending)
    }

    /// Persists every pending mutation of every collection.
    pub async fn persist_pending(&mut self) -> CoreResult<()> {
        for collection in self.collections.values_mut() {
            collection.persist_pending().await?;
        }
        Ok(())
    }

    /// Reloads every collection from disk, in parallel.
    ///
    /// Nothing is replaced unless every collection reads back cleanly, so a
    /// failed reload leaves the previous contents in place.
    pub async fn reload_all(&mut self) -> CoreResult<()> {
        let mut loads = JoinSet::new();
        for (name, collection) in &self.collections {
            let name = name.clone();
            let task = collection.load_task();
            loads.spawn(async move { (name, task.await) });
        }

        let mut loaded = Vec::with_capacity(self.collections.len());
        while let Some(joined) = loads.join_next().await {
            let (name, items) = joined?;
            loaded.push((name, items?));
        }

        for (name, items) in loaded {
            if let Some(collection) = self.collections.get_mut(&name) {
                collection.replace_items(items);
            }
        }
        info!(root = %self.root.display(), "Reloaded all collections");
        Ok(())
    }

    /// Reloads a single collection from disk.
    pub async fn reload(&mut self, name: &str) -> CoreResult<()> {
        self.collection_mut(name)?.reload().await
    }
}
