//! Verify command implementation.

use gitshelf_access::ApiConfig;
use gitshelf_core::Collection;
use std::path::Path;
use tracing::{info, warn};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of collections checked.
    pub collections_checked: usize,
    /// Number of items loaded from the collections that passed.
    pub items_loaded: usize,
    /// Collections that failed to load, with the error.
    pub errors: Vec<(String, String)>,
}

impl VerifyResult {
    /// Returns true if every collection loaded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub async fn run(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Verifying store at {:?}", root);
    println!("Verifying store at {:?}", root);
    println!();

    let result = verify_store(root).await?;

    println!();
    println!("Collections checked: {}", result.collections_checked);
    println!("Items loaded:        {}", result.items_loaded);

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Loads every configured collection and collects the failures.
///
/// An unreadable API configuration is an error; a collection that fails
/// to load is recorded and the check moves on.
pub async fn verify_store(root: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let config = ApiConfig::load(root).await?;
    config.normalize()?;

    let mut result = VerifyResult::default();
    for (name, options) in config.collection_options() {
        result.collections_checked += 1;
        match Collection::open(name.as_str(), root.join(&name), &options).await {
            Ok(collection) => {
                println!("  {:<20} {} items", name, collection.len());
                result.items_loaded += collection.len();
            }
            Err(e) => {
                warn!(collection = %name, error = %e, "Collection failed to load");
                println!("  {:<20} ERROR: {}", name, e);
                result.errors.push((name, e.to_string()));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitshelf_core::ITEM_FILE;
    use gitshelf_testkit::petstore;

    #[tokio::test]
    async fn clean_store_passes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(petstore::ROOT);
        petstore::write_api_config(&root);
        let pets = root.join("pets");
        std::fs::create_dir_all(pets.join("Lucy")).unwrap();
        std::fs::write(
            pets.join("Lucy").join(ITEM_FILE),
            petstore::item_file(&petstore::lucy()),
        )
        .unwrap();

        let result = verify_store(&root).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.collections_checked, 2);
        assert_eq!(result.items_loaded, 1);
    }

    #[tokio::test]
    async fn schema_violation_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(petstore::ROOT);
        petstore::write_api_config(&root);
        let lucy = root.join("pets").join("Lucy");
        std::fs::create_dir_all(&lucy).unwrap();
        std::fs::write(
            lucy.join(ITEM_FILE),
            r#"{"name": "Lucy", "age": "seven", "owners": []}"#,
        )
        .unwrap();

        let result = verify_store(&root).await.unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, "pets");
    }

    #[tokio::test]
    async fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verify_store(dir.path()).await.is_err());
    }
}
