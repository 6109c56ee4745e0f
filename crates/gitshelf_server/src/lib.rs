//! # gitshelf server
//!
//! Binds the five operations of every configured collection to the store,
//! the access policy and the replica.
//!
//! This crate provides:
//! - [`ShelfServer`]: `get`, `post`, `put`, `patch`, `delete` and the
//!   single dispatch entry [`ShelfServer::call`]
//! - [`ServerBuilder`]: registration of custom access predicates,
//!   middleware and authentication strategies
//! - [`ErrorKind`]: the classification a routing layer maps to transport
//!   responses
//!
//! Transport is out of scope. A routing layer turns its requests into a
//! [`Request`] and calls [`ShelfServer::call`]:
//!
//! ```rust,ignore
//! use gitshelf_server::{Operation, Request, ServerBuilder, ServerConfig};
//! use gitshelf_sync::ReplicaConfig;
//!
//! let replica = ReplicaConfig::new("git@example.com:petstore.git", "main", "/srv/petstore");
//! let server = ServerBuilder::new(ServerConfig::new(replica)).build().await?;
//!
//! let request = Request::new()
//!     .with_id("Taco")
//!     .with_header("x-owner", "annie")
//!     .with_body(json!({"age": 2}));
//! let response = server.call(Operation::Patch, "pets", request).await?;
//! if let Some(warning) = response.warning() {
//!     eprintln!("{warning}: the write was discarded in favor of the remote");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod error;
mod server;

pub use config::ServerConfig;
pub use error::{ErrorKind, ServerError, ServerResult};
pub use gitshelf_access::{Operation, Request};
pub use server::{Response, ServerBuilder, ShelfServer};
