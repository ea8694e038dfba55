//! DICOM Metadata Persistence Layer
//!
//! This crate provides the storage side of a DICOMweb service: it indexes
//! instance metadata, translates QIDO-style queries into backend queries and
//! orchestrates deletes and exports across the metadata, file and index
//! stores.
//!
//! # Features
//!
//! - **Query translation**: Typed filter conditions dispatched to a per-backend
//!   generator through a visitor
//! - **Two index backends**: SQLite with joined extended tag tables, and a
//!   Cosmos-style document store addressed by JSON path
//! - **Bound parameters everywhere**: no filter value is interpolated into
//!   query text
//! - **Extended query tags**: User-registered attributes, cached with
//!   single-flight reloads
//! - **Data partitions**: Every operation is scoped by a partition key
//! - **Failure isolation**: Deletes and exports report a result per instance
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! dicom-persistence = { version = "0.1", default-features = false, features = ["sqlite"] }
//! ```
//!
//! - `sqlite` (default) - SQLite index with in-memory and file modes
//! - `document` (default) - Document store backend
//!
//! # Architecture
//!
//! - [`types`] - Identifiers, datasets, partitions and pagination
//! - [`query`] - Query model, parser and the condition visitor
//! - [`core`] - Store traits and identifier resolution
//! - [`backends`] - SQLite, document and object store implementations
//! - [`operations`] - Delete and export services
//! - [`config`] - Serde configuration
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! # #[cfg(feature = "sqlite")]
//! # tokio_test::block_on(async {
//! use chrono::NaiveDate;
//! use dicom::core::VR;
//! use dicom::dictionary_std::tags;
//! use dicom_persistence::backends::sqlite::SqliteIndexStore;
//! use dicom_persistence::core::{IndexStore, QueryStore};
//! use dicom_persistence::query::{core_query_tags, QueryParameters, QueryParser};
//! use dicom_persistence::types::{DicomDataset, PartitionKey};
//!
//! let store = SqliteIndexStore::in_memory().unwrap();
//!
//! let mut dataset = DicomDataset::new();
//! dataset
//!     .insert_string(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3")
//!     .insert_string(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4")
//!     .insert_string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5")
//!     .insert_date(tags::STUDY_DATE, NaiveDate::from_ymd_opt(2020, 9, 22).unwrap());
//!
//! let partition = PartitionKey::DEFAULT;
//! let watermark = store
//!     .begin_create_instance_index(partition, &dataset, &[])
//!     .await
//!     .unwrap();
//! store
//!     .end_create_instance_index(partition, &dataset, watermark)
//!     .await
//!     .unwrap();
//!
//! let expression = QueryParser::new(core_query_tags())
//!     .parse(&QueryParameters {
//!         filters: vec![("StudyDate".into(), "20200101-20201231".into())],
//!         ..Default::default()
//!     })
//!     .unwrap();
//! let page = store.query(partition, &expression, None).await.unwrap();
//! assert_eq!(page.items.len(), 1);
//! assert_eq!(page.items[0].version, watermark);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod operations;
pub mod query;
pub mod types;

// Re-export commonly used types at crate root
pub use config::DicomPersistenceConfig;
pub use error::{StorageError, StorageResult};
pub use types::{DicomDataset, Page, PartitionKey, VersionedInstanceIdentifier};

// Re-export core traits
pub use core::{
    ExtendedQueryTagStore, FileStore, IndexStore, InstanceStore, MetadataStore, QueryStore,
    SecretStore,
};

// Re-export the query model
pub use query::{
    BaseQueryExpression, QueryFilterCondition, QueryFilterConditionVisitor, QueryTag,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
