//! Document store backend.
//!
//! Each instance version is stored as one JSON document:
//!
//! ```text
//! {
//!   "id": "{study}_{series}_{sop}_{version}_{partition}",
//!   "studyId": "...", "seriesId": "...", "sopInstanceId": "...",
//!   "version": 1, "partitionKey": 1,
//!   "value": { "00080020": { "vr": "DA", "Value": ["20200922"] }, ... },
//!   "serializedValue": "{...}"
//! }
//! ```
//!
//! Queries address `value` with bracket paths and bind every value:
//!
//! ```
//! use chrono::NaiveDate;
//! use dicom_persistence::backends::document::DocumentQueryGenerator;
//! use dicom_persistence::query::{
//!     core_query_tags, BaseQueryExpression, QueryFilterCondition, QueryIncludeField,
//! };
//! use dicom_persistence::types::PartitionKey;
//!
//! let study_date = core_query_tags()
//!     .into_iter()
//!     .find(|t| t.name() == "StudyDate")
//!     .unwrap();
//! let expression = BaseQueryExpression::new(
//!     QueryIncludeField::Default,
//!     false,
//!     10,
//!     0,
//!     vec![QueryFilterCondition::DateSingleValue {
//!         tag: study_date,
//!         value: NaiveDate::from_ymd_opt(2020, 9, 22).unwrap(),
//!     }],
//! );
//!
//! let query = DocumentQueryGenerator::generate(&expression, PartitionKey::DEFAULT).unwrap();
//! assert_eq!(
//!     query.text(),
//!     "SELECT * FROM c WHERE (c.partitionKey = @partitionKey) AND \
//!      (c['value']['00080020']['Value'][0] = @p0)"
//! );
//! ```

mod container;
mod generator;
mod model;
mod store;

pub use container::{DocumentContainer, FeedPage, InMemoryContainer};
pub use generator::{
    DocumentPath, DocumentPredicate, DocumentQuery, DocumentQueryGenerator, QueryParameter,
    fuzzy_name_pattern,
};
pub use model::InstanceDocument;
pub use store::DocumentStore;
