//! # gitshelf core
//!
//! Schema-validated JSON document collections persisted as one directory per
//! item inside a working copy.
//!
//! This crate provides:
//! - [`Schema`]: validation against a JSON-Schema subset
//! - [`AttachmentCodec`]: fields stored as sidecar files next to the item
//! - [`Collection`]: an in-memory table with validated CRUD and persistence
//! - [`Store`]: the set of collections of one working copy
//!
//! ## Example
//!
//! ```rust,ignore
//! use gitshelf_core::{CollectionOptions, Store};
//! use serde_json::json;
//!
//! let mut options = BTreeMap::new();
//! options.insert("pets".into(), CollectionOptions::new().with_id_field("name"));
//! let mut store = Store::open("/srv/shelf/gitshelf", &options).await?;
//!
//! store.collection_mut("pets")?.create(json!({"name": "Taco", "age": 1}))?;
//! store.persist_pending().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod attachment;
mod collection;
mod error;
mod schema;
mod store;

pub use attachment::{AttachmentCodec, AttachmentEncoding, AttachmentSpec, Sidecar};
pub use collection::{Collection, CollectionOptions, ITEM_FILE};
pub use error::{CoreError, CoreResult};
pub use schema::{Schema, Violation};
pub use store::Store;
