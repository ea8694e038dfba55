//! SQLite index store.
//!
//! Holds the queryable index: one row per study, series and instance plus
//! the values of extended query tags in per-type tables. Queries are
//! translated by [`SqlQueryGenerator`] and always run with bound parameters.
//! In-memory databases are convenient for tests; file databases use WAL.
//!
//! # Example
//!
//! ```
//! use dicom_persistence::backends::sqlite::SqliteIndexStore;
//!
//! let store = SqliteIndexStore::in_memory().unwrap();
//! assert!(store.supports_partitions());
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE Study (StudyKey, StudyInstanceUid, PatientId, PatientName,
//!     PatientNameWords, ReferringPhysicianName, StudyDate, StudyDescription,
//!     AccessionNumber, PatientBirthDate, PartitionKey);
//! CREATE TABLE Series (SeriesKey, StudyKey, SeriesInstanceUid, Modality,
//!     PerformedProcedureStepStartDate, ManufacturerModelName, PartitionKey);
//! CREATE TABLE Instance (InstanceKey, StudyKey, SeriesKey, StudyInstanceUid,
//!     SeriesInstanceUid, SopInstanceUid, Watermark, Status, CreatedDate,
//!     PartitionKey);
//! CREATE TABLE ExtendedQueryTag (TagKey, TagPath, TagVR, TagPrivateCreator,
//!     TagLevel, TagStatus, QueryStatus, ErrorCount);
//! -- one per storage type: String, Long, Double, DateTime, PersonName
//! CREATE TABLE ExtendedQueryTagString (TagKey, TagValue, StudyKey,
//!     SeriesKey, InstanceKey, Watermark, PartitionKey);
//! ```
//!
//! `PartitionKey` columns and the `DataPartition` table exist from schema
//! version 2.

mod backend;
mod functions;
mod index;
pub mod query;
mod schema;
mod tags;

pub use backend::SqliteIndexStore;
pub use functions::{contains_phrase, person_name_words};
pub use query::{SqlFragment, SqlParam, SqlQueryGenerator};
pub use schema::SCHEMA_VERSION;
