//! # gitshelf testkit
//!
//! Test utilities for gitshelf.
//!
//! This crate provides:
//! - Fixtures: temporary bare remotes and `git` helpers
//! - The petstore documents and API configuration used across crates
//! - Property-based test generators using proptest
//!
//! It deliberately speaks only `serde_json::Value` and paths so every crate
//! of the workspace can use it as a dev-dependency.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gitshelf_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn clones_remote() {
//!     if !git_available() {
//!         return;
//!     }
//!     let remote = TempRemote::new("testbranch");
//!     // ... point a replica at remote.url()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod petstore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::petstore;
}

pub use fixtures::*;
pub use generators::*;
