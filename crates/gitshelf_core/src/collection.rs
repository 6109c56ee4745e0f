//! Document collections backed by one directory per item.
//!
//! On-disk layout of a collection:
//!
//! ```text
//! <dir>/
//! ├─ <id>/
//! │  ├─ _item.json      # canonical document minus attachment fields
//! │  └─ <field>.<ext>   # one sidecar per present attachment field
//! └─ <id>.json          # legacy flat layout (read, migrated on next write)
//! ```
//!
//! The in-memory table is authoritative between syncs. Mutations only touch
//! memory and mark the item dirty; [`Collection::persist`] and
//! [`Collection::persist_pending`] write the affected files.

use crate::attachment::{AttachmentCodec, AttachmentSpec};
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// File holding the canonical document inside an item directory.
pub const ITEM_FILE: &str = "_item.json";
/// Suffix of in-flight writes; such files are never loaded.
const TEMP_SUFFIX: &str = ".tmp";
/// Extension of legacy flat item files.
const FLAT_EXTENSION: &str = ".json";

fn default_id_field() -> String {
    "id".to_string()
}

/// Declarative configuration of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Name of the identifier field.
    #[serde(default = "default_id_field")]
    pub id: String,
    /// Optional schema every item must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Attachment fields and their sidecar configuration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, AttachmentSpec>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            id: default_id_field(),
            schema: None,
            attachments: BTreeMap::new(),
        }
    }
}

impl CollectionOptions {
    /// Creates options with the default identifier field and no schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identifier field.
    #[must_use]
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id = field.into();
        self
    }

    /// Sets the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Declares an attachment field.
    #[must_use]
    pub fn with_attachment(mut self, field: impl Into<String>, spec: AttachmentSpec) -> Self {
        self.attachments.insert(field.into(), spec);
        self
    }
}

/// Everything needed to read or write items, cheap to clone into I/O tasks.
#[derive(Debug, Clone)]
struct Layout {
    collection: String,
    dir: PathBuf,
    id_field: String,
    schema: Option<Arc<Schema>>,
    codec: Arc<AttachmentCodec>,
}

/// Where an item was found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Directory,
    Flat,
}

/// A named table of JSON documents.
///
/// Callers always receive copies; the stored documents can only change
/// through the validated mutation methods.
#[derive(Debug)]
pub struct Collection {
    layout: Layout,
    items: HashMap<String, Value>,
    dirty: BTreeSet<String>,
}

impl Collection {
    /// Opens a collection, loading every item stored under `dir`.
    ///
    /// The directory is created if missing. Any unreadable item, identifier
    /// mismatch or schema violation aborts the load with
    /// [`CoreError::Integrity`] naming the item.
    pub async fn open(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        options: &CollectionOptions,
    ) -> CoreResult<Self> {
        let collection = name.into();
        let schema = options
            .schema
            .clone()
            .map(|raw| Schema::new(raw).map(|s| Arc::new(s.with_identifier(&options.id))))
            .transpose()?;

        let codec = AttachmentCodec::new(options.attachments.clone());
        codec.validate()?;

        let layout = Layout {
            collection,
            dir: dir.into(),
            id_field: options.id.clone(),
            schema,
            codec: Arc::new(codec),
        };

        fs::create_dir_all(&layout.dir).await?;
        let items = read_items(layout.clone()).await?;
        info!(
            collection = %layout.collection,
            items = items.len(),
            "Loaded collection"
        );

        Ok(Self {
            layout,
            items,
            dirty: BTreeSet::new(),
        })
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.layout.collection
    }

    /// Returns the identifier field name.
    pub fn id_field(&self) -> &str {
        &self.layout.id_field
    }

    /// Returns the backing directory.
    pub fn directory(&self) -> &Path {
        &self.layout.dir
    }

    /// Returns the effective schema, including the injected identifier.
    pub fn schema(&self) -> Option<&Schema> {
        self.layout.schema.as_deref()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the collection holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if an item with this identifier exists.
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Returns true if some mutation has not been persisted yet.
    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Returns a copy of the item, or `None` if absent.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.items.get(id).cloned()
    }

    /// Returns copies of every item, in no particular order.
    pub fn list(&self) -> Vec<Value> {
        self.items.values().cloned().collect()
    }

    /// Extracts and checks the identifier of `document`.
    pub fn identifier_of(&self, document: &Value) -> CoreResult<String> {
        match document.get(&self.layout.id_field) {
            None | Some(Value::Null) => Err(CoreError::MissingIdentifier {
                collection: self.layout.collection.clone(),
                field: self.layout.id_field.clone(),
            }),
            Some(Value::String(id)) => {
                check_identifier(&self.layout.collection, id)?;
                Ok(id.clone())
            }
            Some(other) => Err(CoreError::InvalidIdentifier {
                collection: self.layout.collection.clone(),
                id: other.to_string(),
                reason: "identifiers must be strings".into(),
            }),
        }
    }

    /// Inserts a new item and returns its identifier.
    pub fn create(&mut self, document: Value) -> CoreResult<String> {
        let id = self.identifier_of(&document)?;
        self.validate(&document)?;
        if self.items.contains_key(&id) {
            return Err(CoreError::AlreadyExists {
                collection: self.layout.collection.clone(),
                id,
            });
        }
        self.store(id.clone(), document);
        Ok(id)
    }

    /// Inserts or overwrites an item and returns its identifier.
    pub fn replace(&mut self, document: Value) -> CoreResult<String> {
        let id = self.identifier_of(&document)?;
        self.validate(&document)?;
        self.store(id.clone(), document);
        Ok(id)
    }

    /// Shallow-merges the fields of `document` into an existing item.
    ///
    /// Fields not present in `document` keep their stored values. The merged
    /// result is validated before it replaces the stored item.
    pub fn merge(&mut self, document: Value) -> CoreResult<String> {
        let id = self.identifier_of(&document)?;
        let mut merged = self
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(&self.layout.collection, &id))?;

        if let (Value::Object(target), Value::Object(fields)) = (&mut merged, document) {
            for (field, value) in fields {
                target.insert(field, value);
            }
        }

        self.validate(&merged)?;
        self.store(id.clone(), merged);
        Ok(id)
    }

    /// Removes an item and returns its identifier.
    pub fn remove(&mut self, id: &str) -> CoreResult<String> {
        if self.items.remove(id).is_none() {
            return Err(CoreError::not_found(&self.layout.collection, id));
        }
        self.dirty.insert(id.to_string());
        Ok(id.to_string())
    }

    /// Writes items to disk.
    ///
    /// With an identifier, writes that item, or deletes its files if it no
    /// longer exists in memory. Without one, writes every item in parallel.
    pub async fn persist(&self, id: Option<&str>) -> CoreResult<()> {
        match id {
            Some(id) => persist_item(self.layout.clone(), id.to_string(), self.get(id)).await,
            None => {
                let mut writes = JoinSet::new();
                for (id, document) in &self.items {
                    writes.spawn(persist_item(
                        self.layout.clone(),
                        id.clone(),
                        Some(document.clone()),
                    ));
                }
                while let Some(joined) = writes.join_next().await {
                    joined??;
                }
                debug!(collection = %self.layout.collection, "Persisted all items");
                Ok(())
            }
        }
    }

    /// Persists every item touched since the last persist or reload.
    pub async fn persist_pending(&mut self) -> CoreResult<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let ids = std::mem::take(&mut self.dirty);

        let mut writes = JoinSet::new();
        for id in &ids {
            writes.spawn(persist_item(
                self.layout.clone(),
                id.clone(),
                self.items.get(id).cloned(),
            ));
        }

        let mut result = Ok(());
        while let Some(joined) = writes.join_next().await {
            if let Err(e) = joined.map_err(CoreError::from).and_then(|r| r) {
                result = Err(e);
                break;
            }
        }
        if result.is_err() {
            // Not knowing which writes landed, keep everything pending.
            self.dirty = ids;
        }
        result
    }

    /// Rebuilds the in-memory table from the directory as it is now.
    ///
    /// On failure the previous contents are kept and the error is returned.
    pub async fn reload(&mut self) -> CoreResult<()> {
        let items = read_items(self.layout.clone()).await?;
        self.replace_items(items);
        Ok(())
    }

    /// Returns a task that reads the directory without borrowing `self`.
    pub(crate) fn load_task(
        &self,
    ) -> impl std::future::Future<Output = CoreResult<HashMap<String, Value>>> + Send + 'static
    {
        read_items(self.layout.clone())
    }

    pub(crate) fn replace_items(&mut self, items: HashMap<String, Value>) {
        debug!(
            collection = %self.layout.collection,
            items = items.len(),
            "Reloaded collection"
        );
        self.items = items;
        self.dirty.clear();
    }

    fn validate(&self, document: &Value) -> CoreResult<()> {
        if let Some(schema) = &self.layout.schema {
            schema
                .validate(document)
                .map_err(|violations| CoreError::SchemaViolation {
                    collection: self.layout.collection.clone(),
                    violations,
                })?;
        }
        self.layout.codec.check(document)
    }

    fn store(&mut self, id: String, document: Value) {
        self.dirty.insert(id.clone());
        self.items.insert(id, document);
    }
}

/// Rejects identifiers that cannot name exactly one directory entry.
fn check_identifier(collection: &str, id: &str) -> CoreResult<()> {
    let reason = if id.is_empty() {
        Some("identifier is empty")
    } else if id.starts_with('.') {
        Some("identifier must not start with '.'")
    } else if id.contains(['/', '\\', '\0']) {
        Some("identifier must not contain path separators")
    } else if id.ends_with(TEMP_SUFFIX) {
        Some("identifier must not end with .tmp")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(CoreError::InvalidIdentifier {
            collection: collection.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

async fn read_items(layout: Layout) -> CoreResult<HashMap<String, Value>> {
    // Git does not track empty directories, so a clean checkout may lack one.
    let mut entries = match fs::read_dir(&layout.dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    let mut reads = JoinSet::new();

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().map(str::to_owned) else {
            warn!(collection = %layout.collection, entry = ?file_name, "Skipping non UTF-8 entry");
            continue;
        };
        if name.starts_with('.') || name.ends_with(TEMP_SUFFIX) {
            continue;
        }

        let path = entry.path();
        let layout = layout.clone();
        if entry.file_type().await?.is_dir() {
            reads.spawn(async move { read_item_dir(&layout, name, path).await });
        } else if let Some(id) = name.strip_suffix(FLAT_EXTENSION) {
            let id = id.to_string();
            reads.spawn(async move { read_flat_item(&layout, id, path).await });
        }
    }

    let mut items = HashMap::new();
    let mut flat = HashMap::new();
    while let Some(joined) = reads.join_next().await {
        match joined?? {
            Some((id, document, Source::Directory)) => {
                items.insert(id, document);
            }
            Some((id, document, Source::Flat)) => {
                flat.insert(id, document);
            }
            None => {}
        }
    }
    for (id, document) in flat {
        items.entry(id).or_insert(document);
    }
    Ok(items)
}

async fn read_item_dir(
    layout: &Layout,
    id: String,
    dir: PathBuf,
) -> CoreResult<Option<(String, Value, Source)>> {
    let Some(bytes) = read_optional(&dir.join(ITEM_FILE)).await? else {
        debug!(collection = %layout.collection, item = %id, "Skipping directory without {ITEM_FILE}");
        return Ok(None);
    };
    let mut document = parse_item(layout, &id, &bytes)?;

    for field in layout.codec.fields() {
        let Some(file_name) = layout.codec.file_name(field) else {
            continue;
        };
        if let Some(bytes) = read_optional(&dir.join(&file_name)).await? {
            let value = layout.codec.decode(field, bytes).map_err(|e| {
                CoreError::integrity(&layout.collection, &id, format!("{file_name}: {e}"))
            })?;
            if let Value::Object(fields) = &mut document {
                fields.insert(field.to_string(), value);
            }
        }
    }

    finish_item(layout, id, document, Source::Directory).map(Some)
}

async fn read_flat_item(
    layout: &Layout,
    id: String,
    path: PathBuf,
) -> CoreResult<Option<(String, Value, Source)>> {
    let bytes = fs::read(&path).await?;
    let document = parse_item(layout, &id, &bytes)?;
    finish_item(layout, id, document, Source::Flat).map(Some)
}

fn parse_item(layout: &Layout, id: &str, bytes: &[u8]) -> CoreResult<Value> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| CoreError::integrity(&layout.collection, id, format!("invalid JSON: {e}")))?;
    if !document.is_object() {
        return Err(CoreError::integrity(
            &layout.collection,
            id,
            "item is not a JSON object",
        ));
    }
    Ok(document)
}

fn finish_item(
    layout: &Layout,
    id: String,
    mut document: Value,
    source: Source,
) -> CoreResult<(String, Value, Source)> {
    match document.get(&layout.id_field) {
        Some(Value::String(stored)) if *stored == id => {}
        None => {
            if let Value::Object(fields) = &mut document {
                fields.insert(layout.id_field.clone(), Value::String(id.clone()));
            }
        }
        Some(other) => {
            return Err(CoreError::integrity(
                &layout.collection,
                &id,
                format!("stored identifier {other} does not match its file name"),
            ));
        }
    }

    if let Some(schema) = &layout.schema {
        if let Err(violations) = schema.validate(&document) {
            let rendered: Vec<String> = violations.iter().map(ToString::to_string).collect();
            return Err(CoreError::integrity(
                &layout.collection,
                &id,
                format!("schema violation: {}", rendered.join("; ")),
            ));
        }
    }

    Ok((id, document, source))
}

async fn persist_item(layout: Layout, id: String, document: Option<Value>) -> CoreResult<()> {
    match document {
        Some(document) => write_item(&layout, &id, &document).await,
        None => delete_item(&layout, &id).await,
    }
}

async fn write_item(layout: &Layout, id: &str, document: &Value) -> CoreResult<()> {
    let dir = layout.dir.join(id);
    fs::create_dir_all(&dir).await?;

    let (canonical, sidecars) = layout.codec.split(document)?;
    let mut bytes = serde_json::to_vec_pretty(&canonical)?;
    bytes.push(b'\n');
    write_atomic(&dir.join(ITEM_FILE), &bytes).await?;

    let mut writes = JoinSet::new();
    let mut written = BTreeSet::new();
    for sidecar in sidecars {
        written.insert(sidecar.field.clone());
        let path = dir.join(&sidecar.file_name);
        writes.spawn(async move { write_atomic(&path, &sidecar.bytes).await });
    }
    // Dropping the set on the first error aborts the remaining writes.
    while let Some(joined) = writes.join_next().await {
        joined??;
    }

    // A sidecar of a field the document no longer has would resurrect it.
    for field in layout.codec.fields() {
        if !written.contains(field) {
            if let Some(file_name) = layout.codec.file_name(field) {
                remove_if_exists(&dir.join(file_name)).await?;
            }
        }
    }
    remove_flat_file(layout, id).await?;

    debug!(collection = %layout.collection, item = %id, "Persisted item");
    Ok(())
}

async fn delete_item(layout: &Layout, id: &str) -> CoreResult<()> {
    let dir = layout.dir.join(id);
    remove_if_exists(&dir.join(ITEM_FILE)).await?;
    for field in layout.codec.fields() {
        if let Some(file_name) = layout.codec.file_name(field) {
            remove_if_exists(&dir.join(file_name)).await?;
        }
    }
    remove_flat_file(layout, id).await?;

    match fs::remove_dir(&dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            // Without _item.json the directory is skipped on load.
            debug!(collection = %layout.collection, item = %id, error = %e, "Left item directory in place");
        }
    }

    debug!(collection = %layout.collection, item = %id, "Deleted item");
    Ok(())
}

async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes the legacy flat file of `id`, if there is one.
///
/// `<id>.json` may also be the item directory of another identifier, which
/// is left alone.
async fn remove_flat_file(layout: &Layout, id: &str) -> io::Result<()> {
    let path = layout.dir.join(format!("{id}{FLAT_EXTENSION}"));
    match fs::symlink_metadata(&path).await {
        Ok(meta) if meta.is_file() => remove_if_exists(&path).await,
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Writes `bytes` to `path` through a synced temporary file and a rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(TEMP_SUFFIX);
    let temp = PathBuf::from(temp);

    let mut file = fs::File::create(&temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn pet_options() -> CollectionOptions {
        CollectionOptions::new().with_id_field("name").with_schema(json!({
            "type": "object",
            "properties": {
                "age": { "type": "number" },
                "type": { "type": "string" },
                "owners": { "type": "array", "items": { "type": "string" } }
            }
        }))
    }

    fn taco() -> Value {
        json!({"name": "Taco", "owners": ["annie"], "age": 1, "type": "cat"})
    }

    async fn open_pets(dir: &TempDir) -> Collection {
        Collection::open("pets", dir.path().join("pets"), &pet_options())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_returns_equal_copy() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;

        let id = pets.create(taco()).unwrap();
        assert_eq!(id, "Taco");
        assert_eq!(pets.get("Taco"), Some(taco()));
        assert!(pets.has_pending());
    }

    #[tokio::test]
    async fn returned_copies_do_not_alias_storage() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();

        let mut copy = pets.get("Taco").unwrap();
        copy["age"] = json!(99);
        assert_eq!(pets.get("Taco").unwrap()["age"], json!(1));
    }

    #[tokio::test]
    async fn missing_identifier_leaves_collection_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();

        let nameless = json!({"owners": [], "age": 3});
        for result in [
            pets.create(nameless.clone()),
            pets.replace(nameless.clone()),
            pets.merge(nameless.clone()),
        ] {
            assert!(matches!(result, Err(CoreError::MissingIdentifier { .. })));
        }
        assert_eq!(pets.len(), 1);
        assert_eq!(pets.get("Taco"), Some(taco()));
    }

    #[tokio::test]
    async fn create_twice_is_rejected_replace_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;

        pets.create(taco()).unwrap();
        assert!(matches!(
            pets.create(taco()),
            Err(CoreError::AlreadyExists { .. })
        ));

        pets.replace(taco()).unwrap();
        let first = pets.list();
        pets.replace(taco()).unwrap();
        assert_eq!(pets.list(), first);
    }

    #[tokio::test]
    async fn schema_violation_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;

        let mut bad = taco();
        bad["age"] = json!("1");
        assert!(matches!(
            pets.create(bad),
            Err(CoreError::SchemaViolation { .. })
        ));
        assert!(pets.is_empty());
        assert!(!pets.has_pending());
    }

    #[tokio::test]
    async fn merge_keeps_unmentioned_fields() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();

        pets.merge(json!({"name": "Taco", "age": 2})).unwrap();
        let stored = pets.get("Taco").unwrap();
        assert_eq!(stored["age"], json!(2));
        assert_eq!(stored["owners"], json!(["annie"]));

        assert!(matches!(
            pets.merge(json!({"name": "Lucy", "age": 2})),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            pets.merge(json!({"name": "Taco", "age": "old"})),
            Err(CoreError::SchemaViolation { .. })
        ));
        assert_eq!(pets.get("Taco").unwrap()["age"], json!(2));
    }

    #[tokio::test]
    async fn remove_requires_existing_item() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();

        assert_eq!(pets.remove("Taco").unwrap(), "Taco");
        assert!(pets.get("Taco").is_none());
        assert!(matches!(pets.remove("Taco"), Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn identifiers_are_opaque_strings() {
        let dir = TempDir::new().unwrap();
        let mut owners = Collection::open("owners", dir.path().join("owners"), &CollectionOptions::new())
            .await
            .unwrap();

        assert!(matches!(
            owners.create(json!({"id": 7})),
            Err(CoreError::InvalidIdentifier { .. })
        ));
        for bad in ["", "..", ".hidden", "a/b", "a\\b", "x.tmp"] {
            assert!(
                matches!(
                    owners.create(json!({ "id": bad })),
                    Err(CoreError::InvalidIdentifier { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
        owners.create(json!({"id": "007"})).unwrap();
        assert!(owners.get("7").is_none());
    }

    #[tokio::test]
    async fn persist_writes_pretty_item_file() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();
        pets.persist(Some("Taco")).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("pets/Taco/_item.json")).unwrap();
        assert!(written.contains("\n  \"name\": \"Taco\""));
        assert!(written.ends_with("}\n"));
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, taco());
    }

    #[tokio::test]
    async fn persist_after_remove_deletes_files() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();
        pets.persist(Some("Taco")).await.unwrap();

        pets.remove("Taco").unwrap();
        pets.persist(Some("Taco")).await.unwrap();
        assert!(!dir.path().join("pets/Taco").exists());
    }

    #[tokio::test]
    async fn attachments_round_trip_through_sidecars() {
        let dir = TempDir::new().unwrap();
        let options = CollectionOptions::new()
            .with_attachment("bio", AttachmentSpec::Extension("md".into()));
        let mut owners = Collection::open("owners", dir.path().join("owners"), &options)
            .await
            .unwrap();

        let annie = json!({"id": "annie", "name": "Annie", "bio": "# Annie\nLikes cats.\n"});
        owners.create(annie.clone()).unwrap();
        owners.persist_pending().await.unwrap();
        assert!(!owners.has_pending());

        let item: Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("owners/annie/_item.json")).unwrap(),
        )
        .unwrap();
        assert!(item.get("bio").is_none());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("owners/annie/bio.md")).unwrap(),
            "# Annie\nLikes cats.\n"
        );

        owners.reload().await.unwrap();
        assert_eq!(owners.get("annie"), Some(annie));
    }

    #[tokio::test]
    async fn dropped_attachment_does_not_come_back() {
        let dir = TempDir::new().unwrap();
        let options = CollectionOptions::new()
            .with_attachment("bio", AttachmentSpec::Extension("md".into()));
        let mut owners = Collection::open("owners", dir.path().join("owners"), &options)
            .await
            .unwrap();

        owners.create(json!({"id": "annie", "bio": "old"})).unwrap();
        owners.persist_pending().await.unwrap();
        owners.replace(json!({"id": "annie"})).unwrap();
        owners.persist_pending().await.unwrap();

        owners.reload().await.unwrap();
        assert_eq!(owners.get("annie"), Some(json!({"id": "annie"})));
    }

    #[tokio::test]
    async fn reads_legacy_flat_layout_and_migrates_on_write() {
        let dir = TempDir::new().unwrap();
        let pets_dir = dir.path().join("pets");
        std::fs::create_dir_all(&pets_dir).unwrap();
        std::fs::write(pets_dir.join("Taco.json"), taco().to_string()).unwrap();

        let mut pets = Collection::open("pets", &pets_dir, &pet_options()).await.unwrap();
        assert_eq!(pets.get("Taco"), Some(taco()));

        pets.merge(json!({"name": "Taco", "age": 2})).unwrap();
        pets.persist_pending().await.unwrap();
        assert!(!pets_dir.join("Taco.json").exists());
        assert!(pets_dir.join("Taco/_item.json").exists());
    }

    #[tokio::test]
    async fn load_injects_missing_identifier() {
        let dir = TempDir::new().unwrap();
        let item_dir = dir.path().join("owners/annie");
        std::fs::create_dir_all(&item_dir).unwrap();
        std::fs::write(item_dir.join(ITEM_FILE), r#"{"name": "Annie"}"#).unwrap();

        let owners = Collection::open("owners", dir.path().join("owners"), &CollectionOptions::new())
            .await
            .unwrap();
        assert_eq!(owners.get("annie"), Some(json!({"id": "annie", "name": "Annie"})));
    }

    #[tokio::test]
    async fn corrupted_item_fails_load_with_integrity_error() {
        let dir = TempDir::new().unwrap();
        let item_dir = dir.path().join("pets/Taco");
        std::fs::create_dir_all(&item_dir).unwrap();
        std::fs::write(
            item_dir.join(ITEM_FILE),
            r#"{"name": "Taco", "owners": ["annie"], "age": "one"}"#,
        )
        .unwrap();

        let err = Collection::open("pets", dir.path().join("pets"), &pet_options())
            .await
            .unwrap_err();
        match err {
            CoreError::Integrity { collection, item, .. } => {
                assert_eq!(collection, "pets");
                assert_eq!(item, "Taco");
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mismatched_identifier_fails_load() {
        let dir = TempDir::new().unwrap();
        let item_dir = dir.path().join("pets/Taco");
        std::fs::create_dir_all(&item_dir).unwrap();
        std::fs::write(item_dir.join(ITEM_FILE), r#"{"name": "Lucy"}"#).unwrap();

        assert!(matches!(
            Collection::open("pets", dir.path().join("pets"), &pet_options()).await,
            Err(CoreError::Integrity { .. })
        ));
    }

    #[tokio::test]
    async fn skips_temporary_and_hidden_entries() {
        let dir = TempDir::new().unwrap();
        let pets_dir = dir.path().join("pets");
        std::fs::create_dir_all(pets_dir.join("Empty")).unwrap();
        std::fs::write(pets_dir.join(".gitkeep"), "").unwrap();
        std::fs::write(pets_dir.join("Taco.json.tmp"), "{").unwrap();

        let pets = Collection::open("pets", &pets_dir, &pet_options()).await.unwrap();
        assert!(pets.is_empty());
    }

    #[tokio::test]
    async fn reload_of_removed_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();
        pets.persist_pending().await.unwrap();

        std::fs::remove_dir_all(dir.path().join("pets")).unwrap();
        pets.reload().await.unwrap();
        assert!(pets.is_empty());
    }

    #[tokio::test]
    async fn item_named_like_a_flat_file_is_not_removed_by_its_sibling() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(json!({"name": "Taco.json", "owners": []})).unwrap();
        pets.persist_pending().await.unwrap();

        pets.create(taco()).unwrap();
        pets.persist_pending().await.unwrap();
        assert!(!pets.has_pending());

        pets.remove("Taco").unwrap();
        pets.persist_pending().await.unwrap();

        let reopened = open_pets(&dir).await;
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains("Taco.json"));
        assert!(dir.path().join("pets").join("Taco.json").join(ITEM_FILE).is_file());
    }

    #[tokio::test]
    async fn attachment_replacing_the_item_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let options = CollectionOptions::new()
            .with_attachment("_item", AttachmentSpec::Extension("json".into()));
        assert!(matches!(
            Collection::open("owners", dir.path().join("owners"), &options).await,
            Err(CoreError::Attachment { .. })
        ));
    }

    #[tokio::test]
    async fn persist_all_writes_every_item() {
        let dir = TempDir::new().unwrap();
        let mut pets = open_pets(&dir).await;
        pets.create(taco()).unwrap();
        pets.create(json!({"name": "Lucy", "owners": ["bbrennan"], "age": 2, "type": "dog"}))
            .unwrap();
        pets.persist(None).await.unwrap();

        let reopened = open_pets(&dir).await;
        assert_eq!(reopened.len(), 2);
    }
}
