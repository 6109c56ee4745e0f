//! Server configuration.

use gitshelf_access::API_FILE;
use gitshelf_sync::ReplicaConfig;
use std::path::PathBuf;

/// Configuration for a [`crate::ShelfServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// The working copy and its remote.
    pub replica: ReplicaConfig,
    /// Name of the API configuration file inside the store root.
    pub api_file: String,
}

impl ServerConfig {
    /// Creates a server configuration for a replica.
    pub fn new(replica: ReplicaConfig) -> Self {
        Self {
            replica,
            api_file: API_FILE.to_string(),
        }
    }

    /// Sets the API configuration file name.
    pub fn with_api_file(mut self, file: impl Into<String>) -> Self {
        self.api_file = file.into();
        self
    }

    /// Returns the directory holding the collections and `api.json`.
    pub fn root(&self) -> PathBuf {
        self.replica.store_root()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(ReplicaConfig::default())
    }
}
