//! Get command implementation.
//!
//! Reads straight from the working copy. Access rules and middleware are
//! not applied.

use gitshelf_access::ApiConfig;
use gitshelf_core::Store;
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Runs the get command.
pub async fn run(
    root: &Path,
    collection: &str,
    id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let value = read(root, collection, id).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Reads one item, or every item sorted by identifier.
pub async fn read(
    root: &Path,
    collection: &str,
    id: Option<&str>,
) -> Result<Value, Box<dyn std::error::Error>> {
    info!("Reading {} from {:?}", collection, root);
    let config = ApiConfig::load(root).await?;
    let store = Store::open(root, &config.collection_options()).await?;
    let items = store.collection(collection)?;

    match id {
        Some(id) => items
            .get(id)
            .ok_or_else(|| format!("No item '{}' in collection '{}'", id, collection).into()),
        None => {
            let mut all = items.list();
            let field = items.id_field().to_string();
            all.sort_by(|a, b| a[&field].to_string().cmp(&b[&field].to_string()));
            Ok(Value::Array(all))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitshelf_core::ITEM_FILE;
    use gitshelf_testkit::petstore;
    use std::path::PathBuf;

    fn seeded() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(petstore::ROOT);
        petstore::write_api_config(&root);
        for pet in [petstore::taco(), petstore::lucy()] {
            let item = root.join("pets").join(pet["name"].as_str().unwrap());
            std::fs::create_dir_all(&item).unwrap();
            std::fs::write(item.join(ITEM_FILE), petstore::item_file(&pet)).unwrap();
        }
        (dir, root)
    }

    #[tokio::test]
    async fn reads_one_item_without_middleware() {
        let (_dir, root) = seeded();
        let taco = read(&root, "pets", Some("Taco")).await.unwrap();
        assert_eq!(taco, petstore::taco());
    }

    #[tokio::test]
    async fn lists_items_sorted_by_identifier() {
        let (_dir, root) = seeded();
        let all = read(&root, "pets", None).await.unwrap();
        assert_eq!(all, serde_json::json!([petstore::lucy(), petstore::taco()]));
    }

    #[tokio::test]
    async fn missing_item_and_collection_are_errors() {
        let (_dir, root) = seeded();
        assert!(read(&root, "pets", Some("Rex")).await.is_err());
        assert!(read(&root, "vets", None).await.is_err());
    }
}
