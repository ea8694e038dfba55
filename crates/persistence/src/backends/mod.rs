//! Storage backend implementations.
//!
//! Index backends are gated behind feature flags. The object store backend
//! is always available.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | SQLite | `sqlite` | Relational index with joined extended tag tables |
//! | Document | `document` | Cosmos-style instance documents queried by JSON path |
//! | Object | - | Files and metadata in any `object_store` implementation |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use dicom_persistence::backends::sqlite::SqliteIndexStore;
//! use dicom_persistence::config::{QueryLimits, SqliteIndexConfig};
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory index
//! let store = SqliteIndexStore::in_memory()?;
//!
//! // Or use a file-based database
//! let config = SqliteIndexConfig {
//!     path: "./data/index.db".to_string(),
//!     ..Default::default()
//! };
//! let store = SqliteIndexStore::new(config, QueryLimits::default())?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "document")]
pub mod document;

pub mod object;
