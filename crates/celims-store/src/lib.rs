//! CE-LIMS entity store
//!
//! SQLite-backed persistence for the laboratory workflow:
//! - Reference data: users, projects, test methods, equipment
//! - Samples, test assignments, test results and raw file metadata
//! - Append-only audit log (SHA-256 hash chained) and chain of custody
//!
//! Repository functions take a `&Connection`, so they run equally against a
//! plain connection or inside a [`Transaction`](rusqlite::Transaction) opened
//! with [`Store::write`]. Every function that writes a foreign key checks that
//! the referenced row exists and is not soft-deleted.

#![allow(missing_docs)]

pub mod error;
pub mod model;
pub mod repo;
pub mod schema;
pub mod seed;
pub mod store;

pub use error::StoreError;
pub use model::*;
pub use store::Store;

/// Store result alias
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
